use async_trait::async_trait;
use recordlayer_kv::{KvTransaction, MutationType};
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::Subspace;

use crate::diff::{group_count_deltas, group_value_deltas, split_group_value};
use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 AVERAGE: a `(sum, count)` pair per group, packed as two
/// adjacent little-endian `i64` accumulators maintained with two
/// independent `MutationType::Add` mutations. Readers divide `sum/count`
/// themselves; the maintainer never computes the quotient (avoids
/// re-deriving it from a stale read under concurrent updates).
pub struct AverageMaintainer {
    pub sum_subspace: Subspace,
    pub count_subspace: Subspace,
    pub root: KeyExpression,
    pub group_by_arity: usize,
    pub index_name: String,
}

impl AverageMaintainer {
    pub fn new(index_name: impl Into<String>, sum_subspace: Subspace, count_subspace: Subspace, root: KeyExpression, group_by_arity: usize) -> Self {
        Self { index_name: index_name.into(), sum_subspace, count_subspace, root, group_by_arity }
    }

    fn value_contributions(&self, record: Option<&Record>) -> Result<Vec<(Vec<recordlayer_tuple::Value>, i64)>, IndexError> {
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

    fn groups(&self, record: Option<&Record>) -> Vec<Vec<recordlayer_tuple::Value>> {
        record.map(|r| self.root.evaluate(&r.fields).into_iter().map(|t| t[..self.group_by_arity.min(t.len())].to_vec()).collect()).unwrap_or_default()
    }
}

#[async_trait]
impl Maintain for AverageMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        let value_deltas = group_value_deltas(&self.value_contributions(old)?, &self.value_contributions(new)?);
        for (group, delta) in value_deltas {
            txn.atomic_op(&self.sum_subspace.pack(&group), MutationType::Add, &delta.to_le_bytes());
        }
        let count_deltas = group_count_deltas(&self.groups(old), &self.groups(new));
        for (group, delta) in count_deltas {
            txn.atomic_op(&self.count_subspace.pack(&group), MutationType::Add, &delta.to_le_bytes());
        }
        Ok(())
    }

    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError> {
        let (b1, e1) = self.sum_subspace.range();
        txn.clear_range(&b1, &e1);
        let (b2, e2) = self.count_subspace.range();
        txn.clear_range(&b2, &e2);
        Ok(())
    }
}
