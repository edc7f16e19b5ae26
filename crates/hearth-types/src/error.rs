use thiserror::Error;

/// Domain error taxonomy. Conflict is always recovered internally via
/// detect-and-reuse and should never reach a caller; Transient covers
/// network/realtime disruption that degrades to a refetch, not a crash.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
