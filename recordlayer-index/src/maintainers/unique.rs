use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::Subspace;

use crate::diff::diff_tuples;
use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 UNIQUE: same entry layout as VALUE, but before writing a
/// new tuple the maintainer range-scans its value-prefix subspace (with a
/// read-conflict range registered over it, so a concurrent writer of the
/// same value is forced to retry rather than both committing) and rejects
/// the write if an entry with a different pk is already present.
pub struct UniqueMaintainer {
    pub subspace: Subspace,
    pub key_expr: KeyExpression,
    pub index_name: String,
}

impl UniqueMaintainer {
    pub fn new(index_name: impl Into<String>, subspace: Subspace, key_expr: KeyExpression) -> Self {
        Self { index_name: index_name.into(), subspace, key_expr }
    }

    fn evaluate(&self, record: Option<&Record>) -> Vec<Vec<recordlayer_tuple::Value>> {
        record.map(|r| self.key_expr.evaluate(&r.fields)).unwrap_or_default()
    }
}

#[async_trait]
impl Maintain for UniqueMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        let old_tuples = self.evaluate(old);
        let new_tuples = self.evaluate(new);
        let (added, removed) = diff_tuples(&old_tuples, &new_tuples);
        let pk = new.or(old).map(|r| r.pk.clone()).unwrap_or_default();

        for tuple in &added {
            let value_subspace = self.subspace.subspace(tuple);
            let (begin, end) = value_subspace.range();
            txn.add_read_conflict_range(&begin, &end);
            let existing = txn.get_range(&begin, &end).await?;
            for (key, _) in &existing {
                let full = value_subspace.unpack(key)?;
                if full != pk {
                    return Err(IndexError::UniqueConstraintViolation {
                        index: self.index_name.clone(),
                        value: tuple.clone(),
                        conflicting_pk: full,
                    });
                }
            }
            let mut full = tuple.clone();
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
