use async_trait::async_trait;
use recordlayer_kv::{KvTransaction, MutationType};
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::Subspace;

use crate::diff::group_count_deltas;
use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 COUNT: one little-endian `i64` per group, maintained via
/// `MutationType::Add` so concurrent updates to distinct groups never
/// conflict with each other.
pub struct CountMaintainer {
    pub subspace: Subspace,
    pub root: KeyExpression,
    pub group_by_arity: usize,
}

impl CountMaintainer {
    pub fn new(subspace: Subspace, root: KeyExpression, group_by_arity: usize) -> Self {
        Self { subspace, root, group_by_arity }
    }

    fn groups(&self, record: Option<&Record>) -> Vec<Vec<recordlayer_tuple::Value>> {
        record
            .map(|r| self.root.evaluate(&r.fields).into_iter().map(|t| t[..self.group_by_arity.min(t.len())].to_vec()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Maintain for CountMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        let deltas = group_count_deltas(&self.groups(old), &self.groups(new));
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
