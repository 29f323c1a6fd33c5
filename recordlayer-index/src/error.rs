use recordlayer_tuple::Value;
use thiserror::Error;

/// `spec.md` §7 "Integrity"/"Vector/spatial" error kinds a maintainer can
/// surface. Non-retryable; the record store aborts the transaction
/// unchanged on any of these (`spec.md` §4.3 "Failure model").
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unique constraint violated on index {index:?}: value {value:?} already indexed by pk {conflicting_pk:?}")]
    UniqueConstraintViolation { index: String, value: Vec<Value>, conflicting_pk: Vec<Value> },
    #[error("index {0:?} unhealthy: {1}")]
    IndexUnhealthy(String, String),
    #[error(transparent)]
    Kv(#[from] recordlayer_kv::KvError),
    #[error(transparent)]
    Tuple(#[from] recordlayer_tuple::TupleError),
    #[error("malformed aggregate key expression for index {0:?}: {1}")]
    MalformedAggregate(String, &'static str),
}
