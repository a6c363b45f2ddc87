//! Error types for the schema layer.

use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while reading or walking a schema.
///
/// These indicate misconfiguration and are never swallowed by the layers
/// above.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A path segment does not exist in the schema.
    #[error("could not reach schema path '{path}'")]
    PathResolution { path: String },

    /// The path resolved, but not to an object node.
    #[error("schema path '{path}' does not resolve to an object")]
    NotAnObject { path: String },

    /// The path resolved, but not to an array node.
    #[error("schema path '{path}' does not resolve to an array")]
    NotAnArray { path: String },

    /// Schema document written for another format version.
    #[error("unsupported schema version: expected {expected}, got {found}")]
    UnsupportedVersion { expected: u32, found: u32 },

    /// Malformed schema JSON.
    #[error("schema json error: {0}")]
    Json(#[from] serde_json::Error),
}
