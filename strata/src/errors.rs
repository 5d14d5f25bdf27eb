use thiserror::Error;

/// Every storage failure maps onto one of these kinds. Low-level codecs
/// report `Corruption` and abort the enclosing operation; the heap manager
/// propagates them verbatim.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage not open")]
    NotOpen,
    #[error("{0}")]
    NotFound(String),
    #[error("table '{0}' already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    SchemaMismatch(String),
    #[error("{0}")]
    NoSpace(String),
    #[error("{0}")]
    Corruption(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
