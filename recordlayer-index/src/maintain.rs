use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;

use crate::error::IndexError;

/// `spec.md` §4.3: "Each index kind defines a maintainer with two
/// operations invoked inside a caller-supplied transaction". `pk` is
/// carried on `old`/`new` themselves; exactly one of them is `None` for a
/// pure insert/delete, both `Some` for an update.
#[async_trait]
pub trait Maintain: Send + Sync {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError>;

    /// Used by rebuild (`spec.md` §4.9 "Rebuild = clear index subspace +
    /// clear range-set + restart").
    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError>;
}
