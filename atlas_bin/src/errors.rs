use strata::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("column '{0}' does not exist")]
    ColumnNotFound(String),
    #[error("{0}")]
    Unsupported(String),
}
