use thiserror::Error;

use recordlayer_index::IndexError;
use recordlayer_indexer::IndexerError;
use recordlayer_kv::KvError;
use recordlayer_physical::PhysicalError;
use recordlayer_planner::PlannerError;
use recordlayer_query::QueryError;
use recordlayer_schema::SchemaError;
use recordlayer_tuple::{TupleError, Value};

/// Unifies every collaborator's error type behind one facade error, the
/// way a caller-facing API surface gathers its dependencies' errors into
/// one enum rather than asking callers to match on five crates at once.
#[derive(Debug, Error)]
pub enum RecordLayerError {
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Tuple(#[from] TupleError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error(transparent)]
    Physical(#[from] PhysicalError),
    #[error(transparent)]
    Indexer(#[from] IndexerError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("record codec failure: {0}")]
    Decode(String),
    #[error("record with primary key {0:?} already exists under an enforced primary key")]
    DuplicateKey(Vec<Value>),
}
