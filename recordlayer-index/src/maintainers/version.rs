use async_trait::async_trait;
use recordlayer_kv::{KvTransaction, MutationType};
use recordlayer_query::Record;
use recordlayer_tuple::{Subspace, Versionstamp};

use crate::error::IndexError;
use crate::maintain::Maintain;

/// `spec.md` §4.3 VERSION: one entry per record, `pk -> versionstamp`,
/// written with `MutationType::SetVersionstampedValue` so the stored value
/// is exactly the commit version of the transaction that last touched the
/// record, without the maintainer ever reading a clock itself.
pub struct VersionMaintainer {
    pub subspace: Subspace,
}

impl VersionMaintainer {
    pub fn new(subspace: Subspace) -> Self { Self { subspace } }
}

#[async_trait]
impl Maintain for VersionMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        match new {
            Some(record) => {
                let key = self.subspace.pack(&record.pk);
                let placeholder = Versionstamp::incomplete(0).to_bytes();
                txn.atomic_op(&key, MutationType::SetVersionstampedValue, &placeholder);
            }
            None => {
                if let Some(record) = old {
                    txn.clear(&self.subspace.pack(&record.pk));
                }
            }
        }
        Ok(())
    }

    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError> {
        let (begin, end) = self.subspace.range();
        txn.clear_range(&begin, &end);
        Ok(())
    }
}
