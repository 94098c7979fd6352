use thiserror::Error;

pub type ApplyResult<T> = Result<T, ApplyError>;

/// Errors that abort an apply pass. Per-entry problems (bad payloads,
/// store failures) are recorded on the entry instead.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("database error: {0}")]
    Database(#[from] sync_database::DatabaseError),
}
