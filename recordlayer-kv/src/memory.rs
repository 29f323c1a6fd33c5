//! In-memory reference KV backend: a `BTreeMap<Vec<u8>, Vec<u8>>` with
//! snapshot-isolated transactions (copy-on-write snapshot + conflict-range
//! intersection check at commit) and incrementing 10-byte versionstamps.
//! This is the default/test backend, analogous to the teacher's
//! `SledStorageEngine::new_test()`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recordlayer_tuple::Versionstamp;

use crate::{KvDatabase, KvError, KvPair, KvTransaction, MutationType};

#[derive(Debug, Clone)]
enum BufferedOp {
    Set(Vec<u8>),
    Clear,
    Add(Vec<u8>),
    Max(Vec<u8>),
    Min(Vec<u8>),
    /// Offset of the 12-byte incomplete versionstamp placeholder within
    /// the buffered value, filled in at commit.
    SetVersionstamped { value: Vec<u8>, vs_offset: usize },
}

struct SharedState {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Last commit version that touched each key (for conflict detection).
    key_versions: BTreeMap<Vec<u8>, u64>,
    version_counter: u64,
}

pub struct MemoryKv {
    state: Arc<Mutex<SharedState>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(SharedState { data: BTreeMap::new(), key_versions: BTreeMap::new(), version_counter: 0 })) }
    }

    /// Mirrors `SledStorageEngine::new_test()`: a fresh, isolated backend
    /// for unit/integration tests.
    pub fn new_test() -> Self { Self::new() }
}

impl Default for MemoryKv {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl KvDatabase for MemoryKv {
    async fn begin(&self) -> Result<Arc<dyn KvTransaction>, KvError> {
        let guard = self.state.lock().unwrap();
        let snapshot = guard.data.clone();
        let base_version = guard.version_counter;
        drop(guard);
        Ok(Arc::new(MemoryTransaction {
            state: self.state.clone(),
            snapshot,
            base_version,
            writes: Mutex::new(BTreeMap::new()),
            read_conflicts: Mutex::new(Vec::new()),
            write_conflicts: Mutex::new(Vec::new()),
        }))
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<SharedState>>,
    snapshot: BTreeMap<Vec<u8>, Vec<u8>>,
    base_version: u64,
    writes: Mutex<BTreeMap<Vec<u8>, BufferedOp>>,
    read_conflicts: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    write_conflicts: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl MemoryTransaction {
    /// The value a key would have after applying buffered writes, for
    /// reads that hit a key this same transaction already touched.
    fn effective(&self, key: &[u8]) -> Option<Vec<u8>> {
        let writes = self.writes.lock().unwrap();
        if let Some(op) = writes.get(key) {
            let base = self.snapshot.get(key).cloned();
            return apply_op(base, op);
        }
        self.snapshot.get(key).cloned()
    }
}

fn apply_op(base: Option<Vec<u8>>, op: &BufferedOp) -> Option<Vec<u8>> {
    match op {
        BufferedOp::Set(v) => Some(v.clone()),
        BufferedOp::Clear => None,
        BufferedOp::SetVersionstamped { value, .. } => Some(value.clone()),
        BufferedOp::Add(operand) => Some(int_op(base, operand, |a, b| a.wrapping_add(b))),
        BufferedOp::Max(operand) => Some(int_op(base, operand, std::cmp::max)),
        BufferedOp::Min(operand) => Some(int_op(base, operand, std::cmp::min)),
    }
}

fn int_op(base: Option<Vec<u8>>, operand: &[u8], f: impl Fn(i64, i64) -> i64) -> Vec<u8> {
    let base_val = base.map(|b| le_i64(&b)).unwrap_or(0);
    let operand_val = le_i64(operand);
    f(base_val, operand_val).to_le_bytes().to_vec()
}

fn le_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

fn ranges_overlap(a: &(Vec<u8>, Vec<u8>), key: &[u8]) -> bool { key >= a.0.as_slice() && key < a.1.as_slice() }

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> { Ok(self.effective(key)) }

    async fn get_range(&self, begin: &[u8], end: &[u8]) -> Result<Vec<KvPair>, KvError> {
        let mut keys: std::collections::BTreeSet<Vec<u8>> =
            self.snapshot.range(begin.to_vec()..end.to_vec()).map(|(k, _)| k.clone()).collect();
        keys.extend(self.writes.lock().unwrap().range(begin.to_vec()..end.to_vec()).map(|(k, _)| k.clone()));
        let mut out = Vec::new();
        for key in keys {
            if let Some(value) = self.effective(&key) {
                out.push((key, value));
            }
        }
        Ok(out)
    }

    fn set(&self, key: &[u8], value: &[u8]) {
        self.writes.lock().unwrap().insert(key.to_vec(), BufferedOp::Set(value.to_vec()));
        self.add_write_conflict_range(key, &next_key(key));
    }

    fn clear(&self, key: &[u8]) {
        self.writes.lock().unwrap().insert(key.to_vec(), BufferedOp::Clear);
        self.add_write_conflict_range(key, &next_key(key));
    }

    fn clear_range(&self, begin: &[u8], end: &[u8]) {
        let mut writes = self.writes.lock().unwrap();
        let existing: Vec<Vec<u8>> = self.snapshot.range(begin.to_vec()..end.to_vec()).map(|(k, _)| k.clone()).collect();
        for k in existing {
            writes.insert(k, BufferedOp::Clear);
        }
        drop(writes);
        self.add_write_conflict_range(begin, end);
    }

    fn atomic_op(&self, key: &[u8], op: MutationType, operand: &[u8]) {
        let buffered = match op {
            MutationType::Add => BufferedOp::Add(operand.to_vec()),
            MutationType::Max => BufferedOp::Max(operand.to_vec()),
            MutationType::Min => BufferedOp::Min(operand.to_vec()),
            MutationType::SetVersionstampedValue => BufferedOp::SetVersionstamped { value: operand.to_vec(), vs_offset: operand.len().saturating_sub(12) },
        };
        self.writes.lock().unwrap().insert(key.to_vec(), buffered);
        self.add_write_conflict_range(key, &next_key(key));
    }

    fn add_read_conflict_range(&self, begin: &[u8], end: &[u8]) {
        self.read_conflicts.lock().unwrap().push((begin.to_vec(), end.to_vec()));
    }

    fn add_write_conflict_range(&self, begin: &[u8], end: &[u8]) {
        self.write_conflicts.lock().unwrap().push((begin.to_vec(), end.to_vec()));
    }

    async fn commit(&self) -> Result<Versionstamp, KvError> {
        let mut state = self.state.lock().unwrap();

        let conflicts = self.read_conflicts.lock().unwrap().clone();
        for range in conflicts.iter().chain(self.write_conflicts.lock().unwrap().iter()) {
            for (key, version) in state.key_versions.range(range.0.clone()..range.1.clone()) {
                if *version > self.base_version && ranges_overlap(range, key) {
                    return Err(KvError::Retryable(format!("conflict on key {key:?}")));
                }
            }
        }

        state.version_counter += 1;
        let commit_version = state.version_counter;
        let mut txn_bytes = [0u8; 10];
        txn_bytes[2..].copy_from_slice(&commit_version.to_be_bytes());
        let versionstamp = Versionstamp::new(txn_bytes, 0);

        let writes = self.writes.lock().unwrap();
        for (key, op) in writes.iter() {
            let base = state.data.get(key).cloned();
            let resolved_op = match op {
                BufferedOp::SetVersionstamped { value, vs_offset } => {
                    let mut v = value.clone();
                    v[*vs_offset..*vs_offset + 10].copy_from_slice(&versionstamp.to_bytes()[..10]);
                    BufferedOp::Set(v)
                }
                other => other.clone(),
            };
            match apply_op(base, &resolved_op) {
                Some(v) => {
                    state.data.insert(key.clone(), v);
                }
                None => {
                    state.data.remove(key);
                }
            }
            state.key_versions.insert(key.clone(), commit_version);
        }

        Ok(versionstamp)
    }
}

fn next_key(key: &[u8]) -> Vec<u8> {
    let mut k = key.to_vec();
    k.push(0x00);
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_within_same_transaction() {
        let db = MemoryKv::new_test();
        let txn = db.begin().await.unwrap();
        txn.set(b"a", b"1");
        assert_eq!(txn.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        assert_eq!(txn2.get(b"a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn concurrent_writers_conflict() {
        let db = MemoryKv::new_test();
        let txn_a = db.begin().await.unwrap();
        let txn_b = db.begin().await.unwrap();

        txn_a.set(b"k", b"from_a");
        txn_b.add_read_conflict_range(b"k", b"l");
        txn_b.set(b"k", b"from_b");

        txn_a.commit().await.unwrap();
        let result = txn_b.commit().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn range_read_orders_ascending() {
        let db = MemoryKv::new_test();
        let txn = db.begin().await.unwrap();
        txn.set(b"b", b"2");
        txn.set(b"a", b"1");
        txn.set(b"c", b"3");
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let range = txn2.get_range(b"a", b"z").await.unwrap();
        assert_eq!(range, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]);
    }

    #[tokio::test]
    async fn atomic_add_accumulates() {
        let db = MemoryKv::new_test();
        let txn = db.begin().await.unwrap();
        txn.atomic_op(b"counter", MutationType::Add, &1i64.to_le_bytes());
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        txn2.atomic_op(b"counter", MutationType::Add, &1i64.to_le_bytes());
        txn2.commit().await.unwrap();

        let txn3 = db.begin().await.unwrap();
        let value = txn3.get(b"counter").await.unwrap().unwrap();
        assert_eq!(le_i64(&value), 2);
    }
}
