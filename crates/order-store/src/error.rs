//! Error types for order store operations.

use thiserror::Error;

/// Errors surfaced by an order store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another writer changed the record since it was loaded.
    #[error("Optimistic concurrency conflict on order {0}")]
    Conflict(i64),

    /// No order with this id.
    #[error("Order not found: {0}")]
    NotFound(i64),

    /// Backend failure (connectivity, serialization, etc.).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the caller should reload and retry the write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
