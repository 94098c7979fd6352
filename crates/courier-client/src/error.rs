//! Error taxonomy for courier API calls.

use thiserror::Error;

/// Errors from the courier task API.
///
/// The dispatch worker keys its state machine off these: `RateLimited` and
/// `ServerError`/`Http` are retryable, `ClientError` and `InvalidPayload`
/// are permanent.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the request (4xx other than 429). Permanent.
    #[error("Courier rejected request: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// 429 with an optional Retry-After hint in seconds.
    #[error("Courier rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// The API failed server-side (5xx). Retryable.
    #[error("Courier server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// The payload could not be serialized or was structurally invalid.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CourierError {
    /// True when the dispatch should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourierError::Http(_)
                | CourierError::RateLimited { .. }
                | CourierError::ServerError { .. }
        )
    }
}

/// Convenience Result type alias for courier operations.
pub type CourierResult<T> = Result<T, CourierError>;
