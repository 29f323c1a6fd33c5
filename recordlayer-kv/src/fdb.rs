//! Thin adapter over the real `foundationdb` crate, gated behind the
//! `foundationdb-backend` feature the same way the teacher gates its
//! `postgres`/`sled` storage backends behind Cargo features. This is
//! deliberately minimal: `spec.md` §1 treats the KV store's own
//! transaction machinery as an external collaborator, so this module only
//! maps `KvTransaction`/`MutationType` onto `foundationdb::Transaction`
//! and `foundationdb::options::MutationType`.

use async_trait::async_trait;
use foundationdb::{Database, RangeOption, Transaction};
use recordlayer_tuple::Versionstamp;
use std::sync::Arc;

use crate::{KvDatabase, KvError, KvPair, KvTransaction, MutationType};

pub struct FdbDatabase {
    db: Database,
}

impl FdbDatabase {
    /// Callers must have already called `foundationdb::boot()` (or hold
    /// the network-thread guard) for the lifetime of the process; that
    /// setup is CLI/runtime plumbing out of this crate's scope.
    pub fn new(cluster_file: Option<&str>) -> Result<Self, KvError> {
        let db = Database::new(cluster_file).map_err(|e| KvError::Backend(Box::new(e)))?;
        Ok(Self { db })
    }
}

#[async_trait]
impl KvDatabase for FdbDatabase {
    async fn begin(&self) -> Result<Arc<dyn KvTransaction>, KvError> {
        let txn = self.db.create_trx().map_err(|e| KvError::Backend(Box::new(e)))?;
        Ok(Arc::new(FdbTransaction { txn }))
    }
}

struct FdbTransaction {
    txn: Transaction,
}

fn to_mutation_type(op: MutationType) -> foundationdb::options::MutationType {
    match op {
        MutationType::Add => foundationdb::options::MutationType::Add,
        MutationType::Max => foundationdb::options::MutationType::Max,
        MutationType::Min => foundationdb::options::MutationType::Min,
        MutationType::SetVersionstampedValue => foundationdb::options::MutationType::SetVersionstampedValue,
    }
}

fn classify_fdb_error(e: foundationdb::FdbError) -> KvError {
    if e.is_retryable() { KvError::Retryable(e.to_string()) } else { KvError::NonRetryable(e.to_string()) }
}

#[async_trait]
impl KvTransaction for FdbTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        self.txn.get(key, false).await.map(|v| v.map(|slice| slice.to_vec())).map_err(classify_fdb_error)
    }

    async fn get_range(&self, begin: &[u8], end: &[u8]) -> Result<Vec<KvPair>, KvError> {
        let opt = RangeOption::from((begin, end));
        let kvs = self.txn.get_range(&opt, 1_000_000, false).await.map_err(classify_fdb_error)?;
        Ok(kvs.into_iter().map(|kv| (kv.key().to_vec(), kv.value().to_vec())).collect())
    }

    fn set(&self, key: &[u8], value: &[u8]) { self.txn.set(key, value); }

    fn clear(&self, key: &[u8]) { self.txn.clear(key); }

    fn clear_range(&self, begin: &[u8], end: &[u8]) { self.txn.clear_range(begin, end); }

    fn atomic_op(&self, key: &[u8], op: MutationType, operand: &[u8]) { self.txn.atomic_op(key, operand, to_mutation_type(op)); }

    fn add_read_conflict_range(&self, begin: &[u8], end: &[u8]) {
        let _ = self.txn.add_conflict_range(begin, end, foundationdb::options::ConflictRangeType::Read);
    }

    fn add_write_conflict_range(&self, begin: &[u8], end: &[u8]) {
        let _ = self.txn.add_conflict_range(begin, end, foundationdb::options::ConflictRangeType::Write);
    }

    async fn commit(&self) -> Result<Versionstamp, KvError> {
        let versionstamp_fut = self.txn.get_versionstamp();
        self.txn.clone().commit().await.map_err(|e| classify_fdb_error(e.into()))?;
        let bytes = versionstamp_fut.await.map_err(classify_fdb_error)?;
        Ok(Versionstamp::from_bytes(&bytes))
    }
}
