//! Error types for the sync layer.

use restsync_schema::SchemaError;
use restsync_store::StoreError;
use restsync_types::{ChangeType, Iid};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while talking to the API or replaying changes.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    /// The response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Schema or store misuse.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A container reached the save pass in a state that cannot be replayed.
    #[error("unsupported change type: {0}")]
    UnsupportedChangeType(ChangeType),

    #[error("container not found: {0}")]
    ContainerNotFound(Iid),

    /// A lookup was requested on a field without an `fk` rule.
    #[error("field '{field_name}' is not a foreign key")]
    NotAForeignKey { field_name: String },

    /// Saving was refused because dirty containers failed validation.
    #[error("{count} container(s) have validation errors")]
    ValidationBlocked { count: usize },

    /// No URL could be built for a schema path and the ids given.
    #[error("cannot build a url for '{path}'")]
    UnresolvableUrl { path: String },

    /// Client-side paging or filtering needs a display-name field.
    #[error("collection '{collection_path}' has no display field")]
    NoDisplayField { collection_path: String },

    /// Client-side filtering of server-side paged results.
    #[error("client side filtering of server side paged results is not supported")]
    UnsupportedQueryMode,
}

impl SyncError {
    /// Whether this error came from the remote side (network, server or the
    /// payload it sent) rather than from local misconfiguration.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Server { .. } | Self::Protocol(_) | Self::Serialization(_)
        )
    }
}

impl From<SchemaError> for SyncError {
    fn from(err: SchemaError) -> Self {
        Self::Store(err.into())
    }
}
