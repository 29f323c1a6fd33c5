//! Per-kind index maintainers invoked from inside the caller's write
//! transaction: VALUE, UNIQUE, RANK, COUNT, SUM, MIN, MAX, AVERAGE,
//! VERSION, VECTOR, SPATIAL. RANGE_COMPONENT indexes are declared as a
//! pair of VALUE indexes (one per bound) and need no maintainer of their
//! own.
//!
//! Grounded on `storage/sled/src/index.rs`'s `Index`/`IndexManager` split
//! (one maintainer object per declared index, driven by the collection's
//! write path) and `index/src/comparision_index.rs`'s bucketed ordered
//! structure for RANK.

mod diff;
mod error;
mod maintain;
pub mod maintainers;

pub use error::IndexError;
pub use maintain::Maintain;
pub use maintainers::{
    vector_distance, AverageMaintainer, BruteForceVectorIndex, CountMaintainer, GeohashSpatialIndex, MinMaxKind, MinMaxMaintainer,
    RankMaintainer, SpatialIndexBackend, SpatialMaintainer, SumMaintainer, UniqueMaintainer, ValueMaintainer, VectorIndexBackend,
    VectorMaintainer, VersionMaintainer,
};

use async_trait::async_trait;
use recordlayer_kv::KvTransaction;
use recordlayer_query::Record;

/// Dispatches to the concrete maintainer for a declared index, so a caller
/// (the record store's save/delete path, the online indexer) can hold a
/// homogeneous collection of index maintainers regardless of kind
/// (`spec.md` §4.2 "a schema owns a set of index definitions of
/// heterogeneous kind").
pub enum IndexMaintainer {
    Value(ValueMaintainer),
    Unique(UniqueMaintainer),
    Rank(RankMaintainer),
    Count(CountMaintainer),
    Sum(SumMaintainer),
    MinMax(MinMaxMaintainer),
    Average(AverageMaintainer),
    Version(VersionMaintainer),
    Vector(VectorMaintainer),
    Spatial(SpatialMaintainer),
}

#[async_trait]
impl Maintain for IndexMaintainer {
    async fn apply(&self, txn: &dyn KvTransaction, old: Option<&Record>, new: Option<&Record>) -> Result<(), IndexError> {
        match self {
            IndexMaintainer::Value(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Unique(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Rank(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Count(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Sum(m) => m.apply(txn, old, new).await,
            IndexMaintainer::MinMax(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Average(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Version(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Vector(m) => m.apply(txn, old, new).await,
            IndexMaintainer::Spatial(m) => m.apply(txn, old, new).await,
        }
    }

    async fn clear_all(&self, txn: &dyn KvTransaction) -> Result<(), IndexError> {
        match self {
            IndexMaintainer::Value(m) => m.clear_all(txn).await,
            IndexMaintainer::Unique(m) => m.clear_all(txn).await,
            IndexMaintainer::Rank(m) => m.clear_all(txn).await,
            IndexMaintainer::Count(m) => m.clear_all(txn).await,
            IndexMaintainer::Sum(m) => m.clear_all(txn).await,
            IndexMaintainer::MinMax(m) => m.clear_all(txn).await,
            IndexMaintainer::Average(m) => m.clear_all(txn).await,
            IndexMaintainer::Version(m) => m.clear_all(txn).await,
            IndexMaintainer::Vector(m) => m.clear_all(txn).await,
            IndexMaintainer::Spatial(m) => m.clear_all(txn).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordlayer_kv::memory::MemoryKv;
    use recordlayer_kv::KvDatabase;
    use recordlayer_schema::{FieldValue, KeyExpression};
    use recordlayer_tuple::{Subspace, Value};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn dispatch_through_enum_matches_direct_call() {
        let db = MemoryKv::new_test();
        let maintainer = IndexMaintainer::Value(ValueMaintainer::new(Subspace::new(b"I/tag".to_vec()), KeyExpression::field("tag")));

        let record = Record::new(
            "Item",
            vec![Value::Int(1)],
            BTreeMap::from([("tag".to_string(), FieldValue::Scalar(Value::String("red".into())))]),
        );

        let txn = db.begin().await.unwrap();
        maintainer.apply(&*txn, None, Some(&record)).await.unwrap();
        txn.commit().await.unwrap();

        let txn2 = db.begin().await.unwrap();
        let (begin, end) = Subspace::new(b"I/tag".to_vec()).range();
        assert_eq!(txn2.get_range(&begin, &end).await.unwrap().len(), 1);

        let txn3 = db.begin().await.unwrap();
        maintainer.clear_all(&*txn3).await.unwrap();
        txn3.commit().await.unwrap();

        let txn4 = db.begin().await.unwrap();
        assert!(txn4.get_range(&begin, &end).await.unwrap().is_empty());
    }
}
