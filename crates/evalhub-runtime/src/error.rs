//! Runtime error types.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors returned synchronously by a [`Runtime`](crate::Runtime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The evaluation is structurally invalid; nothing was started.
    #[error("invalid evaluation: {0}")]
    InvalidEvaluation(String),

    /// One or more teardown deletions failed. The source holds every cause.
    #[error("teardown failed: {0}")]
    Teardown(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Error raised by a status sink while recording an event.
#[derive(Debug, Error)]
#[error("status sink error: {0}")]
pub struct SinkError(pub String);
