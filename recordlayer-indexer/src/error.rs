use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Kv(#[from] recordlayer_kv::KvError),
    #[error(transparent)]
    Tuple(#[from] recordlayer_tuple::TupleError),
    #[error(transparent)]
    Schema(#[from] recordlayer_schema::SchemaError),
    #[error(transparent)]
    Index(#[from] recordlayer_index::IndexError),
    #[error(transparent)]
    Physical(#[from] recordlayer_physical::PhysicalError),
    #[error("index kind {0:?} has no generic maintainer factory")]
    UnsupportedKind(recordlayer_schema::IndexKind),
}
