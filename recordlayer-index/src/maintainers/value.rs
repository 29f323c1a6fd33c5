use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::Subspace;

use crate::diff::diff_tuples;
use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 VALUE: "write empty value at `IndexSpace/name/V/PK` for
/// each new tuple; clear for each removed tuple."
pub struct ValueMaintainer {
    pub subspace: Subspace,
    pub key_expr: KeyExpression,
}

impl ValueMaintainer {
    pub fn new(subspace: Subspace, key_expr: KeyExpression) -> Self { Self { subspace, key_expr } }

    fn evaluate(&self, record: Option<&Record>) -> Vec<Vec<recordlayer_tuple::Value>> {
        record.map(|r| self.key_expr.evaluate(&r.fields)).unwrap_or_default()
    }
}

#[async_trait]
impl Maintain for ValueMaintainer {
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
    use recordlayer_tuple::Value;
    use std::collections::BTreeMap;

    fn product(pk: i64, category: &str) -> Record {
        Record::new(
            "Product",
            vec![Value::Int(pk)],
            BTreeMap::from([("category".to_string(), FieldValue::Scalar(Value::String(category.to_string())))]),
        )
    }

    #[tokio::test]
    async fn s1_value_index_equality() {
        let db = MemoryKv::new_test();
        let txn = db.begin().await.unwrap();
        let maintainer = ValueMaintainer::new(Subspace::new(b"I/category".to_vec()), KeyExpression::field("category"));

        maintainer.apply(&*txn, None, Some(&product(1, "Electronics"))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let sub = maintainer.subspace.subspace(&[Value::String("Electronics".into())]);
        let (begin, end) = sub.range();
        let entries = txn2.get_range(&begin, &end).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn update_clears_old_and_writes_new() {
        let db = MemoryKv::new_test();
        let maintainer = ValueMaintainer::new(Subspace::new(b"I/category".to_vec()), KeyExpression::field("category"));

        let txn = db.begin().await.unwrap();
        maintainer.apply(&*txn, None, Some(&product(1, "Electronics"))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        maintainer.apply(&*txn2, Some(&product(1, "Electronics")), Some(&product(1, "Books"))).await.unwrap();
        txn2.commit().await.unwrap();

        let txn3 = db.begin().await.unwrap();
        let (begin, end) = maintainer.subspace.range();
        let entries = txn3.get_range(&begin, &end).await.unwrap();
        assert_eq!(entries.len(), 1);
        let decoded = maintainer.subspace.unpack(&entries[0].0).unwrap();
        assert_eq!(decoded[0], Value::String("Books".into()));
    }

    #[tokio::test]
    async fn delete_clears_entry() {
        let db = MemoryKv::new_test();
        let maintainer = ValueMaintainer::new(Subspace::new(b"I/category".to_vec()), KeyExpression::field("category"));

        let txn = db.begin().await.unwrap();
        maintainer.apply(&*txn, None, Some(&product(1, "Electronics"))).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        maintainer.apply(&*txn2, Some(&product(1, "Electronics")), None).await.unwrap();
        txn2.commit().await.unwrap();

        let txn3 = db.begin().await.unwrap();
        let (begin, end) = maintainer.subspace.range();
        assert!(txn3.get_range(&begin, &end).await.unwrap().is_empty());
    }
}
