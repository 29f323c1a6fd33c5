//! The transactional ordered KV store contract the record layer is built
//! against (`spec.md` §1 treats the store itself as an assumed external
//! collaborator, specified only by the operations consumed here), plus an
//! in-memory reference backend exercisable without a real FoundationDB
//! cluster, and an optional thin adapter over the real `foundationdb`
//! crate.
//!
//! Grounded on `ankurah_core::storage::{StorageEngine, StorageBucket}`'s
//! `async_trait` shape and `SledStorageEngine::new_test()`'s in-memory
//! test-constructor convention.

mod error;
#[cfg(feature = "foundationdb-backend")]
pub mod fdb;
pub mod memory;

pub use error::KvError;

use async_trait::async_trait;
use recordlayer_tuple::Versionstamp;
use std::sync::Arc;

/// FoundationDB-style atomic mutation types (`spec.md` §5.3: "atomic_op
/// (add/max/min/versionstamped-key, matching FoundationDB's mutation
/// types)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    /// Little-endian integer addition (`spec.md` §4.3 COUNT/SUM).
    Add,
    Max,
    Min,
    /// Writes `operand` with an embedded incomplete versionstamp replaced
    /// by the transaction's commit version (`spec.md` §4.3 VERSION).
    SetVersionstampedValue,
}

/// One key-value pair as returned by a range read, in ascending key order.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A single strictly-serializable transaction. Reads observe a consistent
/// snapshot; writes are buffered and applied atomically at `commit`.
#[async_trait]
pub trait KvTransaction: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Reads `[begin, end)` in ascending key order.
    async fn get_range(&self, begin: &[u8], end: &[u8]) -> Result<Vec<KvPair>, KvError>;

    fn set(&self, key: &[u8], value: &[u8]);

    fn clear(&self, key: &[u8]);

    fn clear_range(&self, begin: &[u8], end: &[u8]);

    /// `operand` is the mutation's right-hand side: an 8-byte little-endian
    /// integer for `Add`/`Max`/`Min`, or a value containing an embedded
    /// 12-byte incomplete versionstamp placeholder (at `vs_offset`) for
    /// `SetVersionstampedValue`.
    fn atomic_op(&self, key: &[u8], op: MutationType, operand: &[u8]);

    /// Registers a read conflict range: a concurrent transaction that
    /// writes inside `[begin, end)` and commits first causes this
    /// transaction's commit to fail with `KvError::Retryable`
    /// (`spec.md` §4.3 "Conflict range registration is required to
    /// prevent phantom inserts").
    fn add_read_conflict_range(&self, begin: &[u8], end: &[u8]);

    fn add_write_conflict_range(&self, begin: &[u8], end: &[u8]);

    /// Commits the transaction, returning the versionstamp assigned to
    /// this commit (used to fill any `SetVersionstampedValue` mutations
    /// performed within it).
    async fn commit(&self) -> Result<Versionstamp, KvError>;
}

/// A transactional database: opens transactions, is not itself
/// transactional. `run_with_retry` below is the "outer retry loop"
/// `spec.md` §7 says the record layer must not itself perform; it lives
/// here only as a convenience for callers (tests, the online indexer) who
/// want one.
#[async_trait]
pub trait KvDatabase: Send + Sync {
    async fn begin(&self) -> Result<Arc<dyn KvTransaction>, KvError>;
}

/// Caller-supplied retry policy for `run_with_retry`. Not part of the
/// record layer's own API surface (`spec.md` §7: "Retryable KV errors are
/// not auto-retried at this layer").
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { max_retries: 5 } }
}

/// Runs `f` against fresh transactions until it succeeds, a non-retryable
/// error occurs, or `policy.max_retries` is exhausted.
pub async fn run_with_retry<F, Fut, T>(db: &dyn KvDatabase, policy: RetryPolicy, f: F) -> Result<T, KvError>
where
    F: Fn(Arc<dyn KvTransaction>) -> Fut,
    Fut: std::future::Future<Output = Result<T, KvError>>,
{
    let mut attempt = 0;
    loop {
        let txn = db.begin().await?;
        match f(txn.clone()).await {
            Ok(value) => match txn.commit().await {
                Ok(_) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, "commit conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            },
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(attempt, "transaction body retryable error, retrying");
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}
