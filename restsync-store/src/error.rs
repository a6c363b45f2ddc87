use restsync_schema::SchemaError;
use restsync_types::Iid;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("container not found: {0}")]
    ContainerNotFound(Iid),

    /// A container's path and ancestor ids do not fit the schema tree.
    #[error("path '{path}' does not fit the schema tree")]
    UnexpectedPath { path: String },
}
