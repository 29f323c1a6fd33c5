use recordlayer_index::{
    AverageMaintainer, CountMaintainer, IndexMaintainer, MinMaxKind, MinMaxMaintainer, RankMaintainer, SpatialMaintainer, SumMaintainer, UniqueMaintainer, ValueMaintainer,
    VectorMaintainer, VersionMaintainer,
};
use recordlayer_index::{BruteForceVectorIndex, GeohashSpatialIndex};
use recordlayer_schema::{IndexDef, IndexKind, IndexOptions};
use recordlayer_tuple::{layout, Subspace, Value};

use crate::error::IndexerError;

/// Geohash character count for the reference spatial backend; not
/// user-configurable today (`spec.md` treats the spatial structure itself
/// as out of scope, §5.4).
const DEFAULT_GEOHASH_PRECISION: usize = 9;

/// Builds the [`IndexMaintainer`] a declared index requires, so the
/// online indexer (and eventually the record store's write path) can
/// construct maintainers generically from a [`Schema`](recordlayer_schema::Schema)
/// rather than hand-wiring one per kind. A `RANGE_COMPONENT` index is
/// declared as one half of a bound pair (`spec.md` §4.3), each with its
/// own `Range` key expression and its own name, so each half is built as
/// an independent [`ValueMaintainer`] — no paired maintainer type is
/// needed.
pub fn build_maintainer(root: &Subspace, index: &IndexDef) -> Result<IndexMaintainer, IndexerError> {
    let subspace = layout::index_subspace(root, &index.name);
    match index.kind {
        IndexKind::Value | IndexKind::RangeComponent => Ok(IndexMaintainer::Value(ValueMaintainer::new(subspace, index.root.clone()))),
        IndexKind::Unique => Ok(IndexMaintainer::Unique(UniqueMaintainer::new(index.name.clone(), subspace, index.root.clone()))),
        IndexKind::Rank => Ok(IndexMaintainer::Rank(RankMaintainer::new(subspace, index.root.clone()))),
        IndexKind::Count => {
            let arity = aggregate_group_by_arity(index)?;
            Ok(IndexMaintainer::Count(CountMaintainer::new(subspace, index.root.clone(), arity)))
        }
        IndexKind::Sum => {
            let arity = aggregate_group_by_arity(index)?;
            Ok(IndexMaintainer::Sum(SumMaintainer::new(index.name.clone(), subspace, index.root.clone(), arity)))
        }
        IndexKind::Min | IndexKind::Max => {
            let arity = aggregate_group_by_arity(index)?;
            let kind = if index.kind == IndexKind::Min { MinMaxKind::Min } else { MinMaxKind::Max };
            let members = subspace.subspace(&[Value::String("members".into())]);
            Ok(IndexMaintainer::MinMax(MinMaxMaintainer::new(index.name.clone(), subspace, members, index.root.clone(), arity, kind)))
        }
        IndexKind::Average => {
            let arity = aggregate_group_by_arity(index)?;
            let sum_subspace = subspace.subspace(&[Value::String("sum".into())]);
            let count_subspace = subspace.subspace(&[Value::String("count".into())]);
            Ok(IndexMaintainer::Average(AverageMaintainer::new(index.name.clone(), sum_subspace, count_subspace, index.root.clone(), arity)))
        }
        IndexKind::Version => Ok(IndexMaintainer::Version(VersionMaintainer::new(subspace))),
        IndexKind::Vector => {
            let (dimensions, metric) = match &index.options {
                IndexOptions::Vector { dimensions, metric } => (*dimensions, *metric),
                _ => return Err(IndexerError::UnsupportedKind(index.kind)),
            };
            let backend = BruteForceVectorIndex::new(subspace, metric, dimensions);
            Ok(IndexMaintainer::Vector(VectorMaintainer::new(backend, index.root.clone())))
        }
        IndexKind::Spatial => {
            let fields = index.root.referenced_fields();
            let (lat_field, lon_field) = match fields.as_slice() {
                [lat, lon] => (lat.to_string(), lon.to_string()),
                _ => return Err(IndexerError::UnsupportedKind(index.kind)),
            };
            let backend = GeohashSpatialIndex::new(subspace, DEFAULT_GEOHASH_PRECISION);
            Ok(IndexMaintainer::Spatial(SpatialMaintainer::new(backend, lat_field, lon_field)))
        }
    }
}

fn aggregate_group_by_arity(index: &IndexDef) -> Result<usize, IndexerError> {
    match &index.options {
        IndexOptions::Aggregate { group_by_arity } => Ok(*group_by_arity),
        _ => Err(IndexerError::UnsupportedKind(index.kind)),
    }
}
