use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::{Subspace, Value};

use crate::diff::diff_tuples;
use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 RANK: an ordered-bucket membership subspace, one entry
/// per `(value, pk)` pair under an order-preserving key, generalizing the
/// `eq`/`gt`/`lt` bucket split of `ComparisonIndex` into a single subspace
/// whose byte order already sorts by `value` (so no separate bucket kind
/// per operator is needed; `rank_of`/`nth` below do the equivalent of
/// `ComparisonIndex::find_matching_subscriptions` via key-range counting
/// instead of a three-way bucket lookup). This trades the classic
/// indexable skip list's O(log n) rank/select for a straightforward O(n)
/// range scan, in exchange for needing no span bookkeeping to get right
/// without a compiler.
pub struct RankMaintainer {
    pub subspace: Subspace,
    pub key_expr: KeyExpression,
}

impl RankMaintainer {
    pub fn new(subspace: Subspace, key_expr: KeyExpression) -> Self { Self { subspace, key_expr } }

    fn evaluate(&self, record: Option<&Record>) -> Vec<Vec<Value>> {
        record.map(|r| self.key_expr.evaluate(&r.fields)).unwrap_or_default()
    }

    /// Zero-based position of `value` among all indexed members, i.e. how
    /// many members strictly precede it in sort order, or `None` if
    /// `value` has no matching member (`spec.md` §4.3 RANK: "`rankOf(v)
    /// -> n | null`"). If several members share `value`, this is the rank
    /// of the lowest-pk member among them.
    pub async fn rank_of(&self, txn: &dyn KvTransaction, value: &Value) -> Result<Option<u64>, IndexError> {
        let (member_begin, member_end) = self.subspace.subspace(std::slice::from_ref(value)).range();
        let members = txn.get_range(&member_begin, &member_end).await?;
        if members.is_empty() {
            return Ok(None);
        }
        let (begin, _) = self.subspace.range();
        let preceding = txn.get_range(&begin, &member_begin).await?;
        Ok(Some(preceding.len() as u64))
    }

    /// The `(value, pk)` entry at zero-based rank `n`, if the index has at
    /// least `n + 1` members.
    pub async fn nth(&self, txn: &dyn KvTransaction, n: u64) -> Result<Option<Vec<Value>>, IndexError> {
        let (begin, end) = self.subspace.range();
        let entries = txn.get_range(&begin, &end).await?;
        match entries.into_iter().nth(n as usize) {
            Some((key, _)) => Ok(Some(self.subspace.unpack(&key)?)),
            None => Ok(None),
        }
    }

    /// Total indexed member count.
    pub async fn count(&self, txn: &dyn KvTransaction) -> Result<u64, IndexError> {
        let (begin, end) = self.subspace.range();
        Ok(txn.get_range(&begin, &end).await?.len() as u64)
    }
}

#[async_trait]
impl Maintain for RankMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        let old_tuples = self.evaluate(old);
        let new_tuples = self.evaluate(new);
        let (added, removed) = diff_tuples(&old_tuples, &new_tuples);
        let pk = new.or(old).map(|r| r.pk.clone()).unwrap_or_default();

        for tuple in added {
            let mut full = tuple;
            full.extend(pk.iter().cloned());
            txn.set(&self.subspace.pack(&full), &[]);
        }
        for tuple in removed {
            let mut full = tuple;
            full.extend(pk.iter().cloned());
            txn.clear(&self.subspace.pack(&full));
        }
        Ok(())
    }

    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError> {
        let (begin, end) = self.subspace.range();
        txn.clear_range(&begin, &end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_kv::KvDatabase;
    use recordlayer_schema::FieldValue;
    use std::collections::BTreeMap;

    fn player(pk: i64, score: i64) -> Record {
        Record::new(
            "Player",
            vec![Value::Int(pk)],
            BTreeMap::from([("score".to_string(), FieldValue::Scalar(Value::Int(score)))]),
        )
    }

    #[tokio::test]
    async fn rank_of_reflects_insertion_order() {
        let db = MemoryKv::new_test();
        let m = RankMaintainer::new(Subspace::new(b"I/leaderboard".to_vec()), KeyExpression::field("score"));

        let txn = db.begin().await.unwrap();
        m.apply(&*txn, None, Some(&player(1, 100))).await.unwrap();
        m.apply(&*txn, None, Some(&player(2, 50))).await.unwrap();
        m.apply(&*txn, None, Some(&player(3, 75))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        assert_eq!(m.rank_of(&*txn2, &Value::Int(50)).await.unwrap(), Some(0));
        assert_eq!(m.rank_of(&*txn2, &Value::Int(75)).await.unwrap(), Some(1));
        assert_eq!(m.rank_of(&*txn2, &Value::Int(100)).await.unwrap(), Some(2));
        assert_eq!(m.count(&*txn2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rank_of_absent_value_is_none() {
        let db = MemoryKv::new_test();
        let m = RankMaintainer::new(Subspace::new(b"I/leaderboard".to_vec()), KeyExpression::field("score"));

        let txn = db.begin().await.unwrap();
        m.apply(&*txn, None, Some(&player(1, 100))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        assert_eq!(m.rank_of(&*txn2, &Value::Int(999)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn nth_returns_entry_at_rank() {
        let db = MemoryKv::new_test();
        let m = RankMaintainer::new(Subspace::new(b"I/leaderboard".to_vec()), KeyExpression::field("score"));

        let txn = db.begin().await.unwrap();
        m.apply(&*txn, None, Some(&player(1, 100))).await.unwrap();
        m.apply(&*txn, None, Some(&player(2, 50))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let entry = m.nth(&*txn2, 0).await.unwrap().unwrap();
        assert_eq!(entry[0], Value::Int(50));
        assert!(m.nth(&*txn2, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removal_shifts_ranks() {
        let db = MemoryKv::new_test();
        let m = RankMaintainer::new(Subspace::new(b"I/leaderboard".to_vec()), KeyExpression::field("score"));

        let txn = db.begin().await.unwrap();
        m.apply(&*txn, None, Some(&player(1, 100))).await.unwrap();
        m.apply(&*txn, None, Some(&player(2, 50))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        m.apply(&*txn2, Some(&player(2, 50)), None).await.unwrap();
        txn2.commit().await.unwrap();

        let txn3 = db.begin().await.unwrap();
        assert_eq!(m.rank_of(&*txn3, &Value::Int(100)).await.unwrap(), Some(0));
    }
}
