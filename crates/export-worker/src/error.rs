//! Error types for the export workers.

use thiserror::Error;

/// Errors from export queue processing.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Queue persistence failed.
    #[error("Database error: {0}")]
    Database(#[from] sync_database::DatabaseError),

    /// Payload construction failed; needs an operator fix, never retried.
    #[error("Build error: {0}")]
    Build(String),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience Result type alias for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
