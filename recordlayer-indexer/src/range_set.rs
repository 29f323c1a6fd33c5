use recordlayer_kv::KvTransaction;
use recordlayer_tuple::{Subspace, Value};

use crate::error::IndexerError;

/// Persistent record of already-processed byte ranges for one index's
/// online build (`spec.md` §4.9 "range-set... supporting isComplete,
/// missingRanges, markComplete. Progress survives restarts."). Stored as
/// one `{beginBytes} -> endBytes` entry per completed range under
/// `S/rangeSet/{indexName}/…`; adjacent/overlapping ranges are merged on
/// read so the set stays small regardless of shard count.
pub struct RangeSet {
    subspace: Subspace,
}

impl RangeSet {
    pub fn new(subspace: Subspace) -> Self { Self { subspace } }

    pub async fn completed_ranges(&self, txn: &dyn KvTransaction) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let (begin, end) = self.subspace.range();
        let pairs = txn.get_range(&begin, &end).await?;
        let mut ranges = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let tuple = self.subspace.unpack(&key)?;
            if let Some(Value::Bytes(b)) = tuple.into_iter().next() {
                ranges.push((b, value));
            }
        }
        Ok(merge(ranges))
    }

    pub fn mark_complete(&self, txn: &dyn KvTransaction, begin: &[u8], end: &[u8]) {
        txn.set(&self.subspace.pack(&[Value::Bytes(begin.to_vec())]), end);
    }

    pub async fn is_complete(&self, txn: &dyn KvTransaction, begin: &[u8], end: &[u8]) -> Result<bool, IndexerError> {
        let ranges = self.completed_ranges(txn).await?;
        Ok(ranges.iter().any(|(b, e)| b.as_slice() <= begin && end <= e.as_slice()))
    }

    /// Gaps in `[full_begin, full_end)` not yet covered by any completed
    /// range, each capped to at most `max_keys_hint` worth of width isn't
    /// tracked here (byte ranges carry no key-count) — the caller re-splits
    /// a returned gap into shards as it processes it.
    pub async fn missing_ranges(&self, txn: &dyn KvTransaction, full_begin: &[u8], full_end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let completed = self.completed_ranges(txn).await?;
        let mut gaps = Vec::new();
        let mut cursor = full_begin.to_vec();
        for (b, e) in &completed {
            if b.as_slice() > full_end.as_slice() {
                break;
            }
            if *b > cursor {
                gaps.push((cursor.clone(), b.clone()));
            }
            if *e > cursor {
                cursor = e.clone();
            }
        }
        if cursor.as_slice() < full_end {
            gaps.push((cursor, full_end.to_vec()));
        }
        Ok(gaps)
    }

    pub fn clear(&self, txn: &dyn KvTransaction) {
        let (begin, end) = self.subspace.range();
        txn.clear_range(&begin, &end);
    }
}

/// Sorts and fuses touching/overlapping `[begin, end)` ranges so
/// `completed_ranges` never reports redundant fragments.
fn merge(mut ranges: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<(Vec<u8>, Vec<u8>)> {
    ranges.sort();
    let mut out: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(ranges.len());
    for (b, e) in ranges {
        if let Some(last) = out.last_mut() {
            if b <= last.1 {
                if e > last.1 {
                    last.1 = e;
                }
                continue;
            }
        }
        out.push((b, e));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_kv::KvDatabase;

    #[tokio::test]
    async fn marks_and_reports_completion() {
        let db = MemoryKv::new();
        let set = RangeSet::new(Subspace::new(b"rangeSet/idx".to_vec()));
        let txn = db.begin().await.unwrap();
        set.mark_complete(&*txn, b"a", b"m");
        set.mark_complete(&*txn, b"m", b"z");
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        assert!(set.is_complete(&*txn2, b"a", b"z").await.unwrap());
        assert!(set.missing_ranges(&*txn2, b"a", b"z").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_gap_between_disjoint_completed_ranges() {
        let db = MemoryKv::new();
        let set = RangeSet::new(Subspace::new(b"rangeSet/idx".to_vec()));
        let txn = db.begin().await.unwrap();
        set.mark_complete(&*txn, b"a", b"c");
        set.mark_complete(&*txn, b"g", b"z");
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let missing = set.missing_ranges(&*txn2, b"a", b"z").await.unwrap();
        assert_eq!(missing, vec![(b"c".to_vec(), b"g".to_vec())]);
        assert!(!set.is_complete(&*txn2, b"a", b"z").await.unwrap());
    }
}
