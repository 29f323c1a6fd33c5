use async_trait::async_trait;
use recordlayer_kv::{KvTransaction, MutationType};
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::Subspace;

use crate::diff::{group_value_deltas, split_group_value};
use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 SUM: `root` evaluates to `(group..., numeric_value)`
/// tuples; one little-endian `i64` accumulator per group, maintained via
/// `MutationType::Add` of the signed per-group delta between old and new.
pub struct SumMaintainer {
    pub subspace: Subspace,
    pub root: KeyExpression,
    pub group_by_arity: usize,
    pub index_name: String,
}

impl SumMaintainer {
    pub fn new(index_name: impl Into<String>, subspace: Subspace, root: KeyExpression, group_by_arity: usize) -> Self {
        Self { index_name: index_name.into(), subspace, root, group_by_arity }
    }

    fn contributions(&self, record: Option<&Record>) -> Result<Vec<(Vec<recordlayer_tuple::Value>, i64)>, IndexError> {
        match record {
            None => Ok(Vec::new()),
            Some(r) => {
                let tuples = self.root.evaluate(&r.fields);
                let pairs = split_group_value(&tuples, self.group_by_arity);
                if pairs.len() != tuples.len() {
                    return Err(IndexError::MalformedAggregate(self.index_name.clone(), "root key expression must evaluate to (group..., numeric value) tuples"));
                }
                Ok(pairs)
            }
        }
    }
}

#[async_trait]
impl Maintain for SumMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        let deltas = group_value_deltas(&self.contributions(old)?, &self.contributions(new)?);
        for (group, delta) in deltas {
            let key = self.subspace.pack(&group);
            txn.atomic_op(&key, MutationType::Add, &delta.to_le_bytes());
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
    use recordlayer_tuple::Value;
    use std::collections::BTreeMap;

    fn order(pk: i64, customer: &str, amount: i64) -> Record {
        Record::new(
            "Order",
            vec![Value::Int(pk)],
            BTreeMap::from([
                ("customer".to_string(), FieldValue::Scalar(Value::String(customer.to_string()))),
                ("amount".to_string(), FieldValue::Scalar(Value::Int(amount))),
            ]),
        )
    }

    fn read_sum(bytes: &[u8]) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        i64::from_le_bytes(buf)
    }

    #[tokio::test]
    async fn sums_amounts_per_customer() {
        let db = MemoryKv::new_test();
        let root = KeyExpression::concat([KeyExpression::field("customer"), KeyExpression::field("amount")]);
        let maintainer = SumMaintainer::new("customer_total", Subspace::new(b"I/customer_total".to_vec()), root, 1);

        let txn = db.begin().await.unwrap();
        maintainer.apply(&*txn, None, Some(&order(1, "acme", 100))).await.unwrap();
        maintainer.apply(&*txn, None, Some(&order(2, "acme", 50))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let key = maintainer.subspace.pack(&[Value::String("acme".into())]);
        assert_eq!(read_sum(&txn2.get(&key).await.unwrap().unwrap()), 150);
    }

    #[tokio::test]
    async fn update_adjusts_sum_by_delta() {
        let db = MemoryKv::new_test();
        let root = KeyExpression::concat([KeyExpression::field("customer"), KeyExpression::field("amount")]);
        let maintainer = SumMaintainer::new("customer_total", Subspace::new(b"I/customer_total".to_vec()), root, 1);

        let txn = db.begin().await.unwrap();
        maintainer.apply(&*txn, None, Some(&order(1, "acme", 100))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        maintainer.apply(&*txn2, Some(&order(1, "acme", 100)), Some(&order(1, "acme", 80))).await.unwrap();
        txn2.commit().await.unwrap();

        let txn3 = db.begin().await.unwrap();
        let key = maintainer.subspace.pack(&[Value::String("acme".into())]);
        assert_eq!(read_sum(&txn3.get(&key).await.unwrap().unwrap()), 80);
    }
}
