use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;
use recordlayer_schema::KeyExpression;
use recordlayer_tuple::{Subspace, Value};

use crate::diff::split_group_value;
use crate::error::IndexError;
use crate::maintain::Maintain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinMaxKind {
    Min,
    Max,
}

/// `spec.md` §4.3 MIN/MAX: "recompute on deletion of the current extremum
/// via an auxiliary VALUE index or a scan". The auxiliary subspace
/// (`members`) stores one `(group, value, pk) -> ()` entry per contributing
/// record, exactly like a VALUE index over `root`; the primary subspace
/// stores only the winning `(value, pk)` pair per group, so a reader never
/// pays for a scan. On every insert/update/delete this maintainer updates
/// `members` and then recomputes the winner for any group whose extremum
/// may have changed by reading the first (MIN) or last (MAX) remaining
/// member in that group's auxiliary range.
pub struct MinMaxMaintainer {
    pub subspace: Subspace,
    pub members: Subspace,
    pub root: KeyExpression,
    pub group_by_arity: usize,
    pub kind: MinMaxKind,
    pub index_name: String,
}

impl MinMaxMaintainer {
    pub fn new(index_name: impl Into<String>, subspace: Subspace, members: Subspace, root: KeyExpression, group_by_arity: usize, kind: MinMaxKind) -> Self {
        Self { index_name: index_name.into(), subspace, members, root, group_by_arity, kind }
    }

    fn contributions(&self, record: Option<&Record>) -> Result<Vec<(Vec<Value>, i64, Vec<Value>)>, IndexError> {
        match record {
            None => Ok(Vec::new()),
            Some(r) => {
                let tuples = self.root.evaluate(&r.fields);
                let pairs = split_group_value(&tuples, self.group_by_arity);
                if pairs.len() != tuples.len() {
                    return Err(IndexError::MalformedAggregate(self.index_name.clone(), "root key expression must evaluate to (group..., numeric value) tuples"));
                }
                Ok(pairs.into_iter().map(|(group, value)| (group, value, r.pk.clone())).collect())
            }
        }
    }

    async fn recompute(&self, txn: &dyn KvTransaction, group: &[Value]) -> Result<(), IndexError> {
        let group_space = self.members.subspace(group);
        let (begin, end) = group_space.range();
        let mut entries = txn.get_range(&begin, &end).await?;
        let winner = match self.kind {
            MinMaxKind::Min => entries.first(),
            MinMaxKind::Max => {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries.last()
            }
        };
        let key = self.subspace.pack(group);
        match winner {
            Some((member_key, _)) => {
                let tuple = group_space.unpack(member_key)?;
                txn.set(&key, &recordlayer_tuple::encode_tuple(&tuple));
            }
            None => txn.clear(&key),
        }
        Ok(())
    }
}

#[async_trait]
impl Maintain for MinMaxMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        let old_c = self.contributions(old)?;
        let new_c = self.contributions(new)?;

        let mut touched: Vec<Vec<Value>> = Vec::new();
        for (group, value, pk) in &old_c {
            let mut member = vec![Value::Int(*value)];
            member.extend(pk.iter().cloned());
            txn.clear(&self.members.subspace(group).pack(&member));
            touched.push(group.clone());
        }
        for (group, value, pk) in &new_c {
            let mut member = vec![Value::Int(*value)];
            member.extend(pk.iter().cloned());
            txn.set(&self.members.subspace(group).pack(&member), &[]);
            touched.push(group.clone());
        }

        let mut seen = std::collections::BTreeSet::new();
        for group in touched {
            let key = recordlayer_tuple::encode_tuple(&group);
            if seen.insert(key) {
                self.recompute(txn, &group).await?;
            }
        }
        Ok(())
    }

    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError> {
        let (b1, e1) = self.subspace.range();
        txn.clear_range(&b1, &e1);
        let (b2, e2) = self.members.range();
        txn.clear_range(&b2, &e2);
        Ok(())
    }
}
