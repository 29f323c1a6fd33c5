use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown entity {0:?}")]
    UnknownEntity(String),
    #[error("unknown index {0:?}")]
    UnknownIndex(String),
    #[error("index {name:?} already registered")]
    DuplicateIndex { name: String },
    #[error("entity {name:?} already registered")]
    DuplicateEntity { name: String },
    #[error(transparent)]
    IndexState(#[from] crate::index::IndexStateError),
}
