use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhysicalError {
    #[error(transparent)]
    Kv(#[from] recordlayer_kv::KvError),
    #[error(transparent)]
    Tuple(#[from] recordlayer_tuple::TupleError),
    #[error(transparent)]
    Schema(#[from] recordlayer_schema::SchemaError),
    #[error(transparent)]
    Index(#[from] recordlayer_index::IndexError),
    #[error("record decode failed: {0}")]
    Decode(String),
    #[error("index {0:?} is not a vector index")]
    NotAVectorIndex(String),
}
