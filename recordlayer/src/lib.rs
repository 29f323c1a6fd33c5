//! Caller-facing record store (`spec.md` §1 "Overview"): the one object an
//! application holds to create, save, fetch, delete, and query records,
//! and to drive an index through its build/enable/rebuild lifecycle. This
//! crate wires together the tuple codec, schema, transactional KV store,
//! index maintainers, query planner, physical executor, online indexer,
//! and health tracker crates into the single surface `spec.md` describes;
//! it owns no storage format or algorithm of its own.

mod codec;
mod error;
mod index_state;
mod query_builder;
mod store;

pub use codec::{BincodeRecordCodec, RecordCodec};
pub use error::RecordLayerError;
pub use index_state::IndexStateManager;
pub use query_builder::{QueryBuilder, RecordStream};
pub use store::RecordStore;

pub use recordlayer_health::{HealthConfig, HealthSnapshot, HealthState, HealthTracker};
pub use recordlayer_index::IndexError;
pub use recordlayer_indexer::{DanglingEntry, IndexerConfig, IndexerError, MissingEntry, OnlineIndexer, RangeFailure, ScrubReport, Scrubber};
pub use recordlayer_kv::{memory::MemoryKv, KvDatabase, KvError, KvTransaction, MutationType, RetryPolicy};
pub use recordlayer_physical::{PhysicalError, RecordLoader};
pub use recordlayer_planner::{Histogram, Plan, Planner, PlannerConfig, PlannerError, Query, SortKey, TableStats};
pub use recordlayer_query::{ComparisonOp, Filter, FilterLeaf, QueryError, Record};
pub use recordlayer_schema::{
    BoundaryType, Entity, FieldCardinality, FieldDescriptor, FieldType, FieldValue, IndexDef, IndexKind, IndexOptions, IndexState, IndexStateError,
    KeyExpression, RangeComponent, RangeValue, Schema, SchemaError, VectorMetric,
};
pub use recordlayer_tuple::{encode_tuple, decode_tuple, Subspace, TupleError, Value, Versionstamp};
