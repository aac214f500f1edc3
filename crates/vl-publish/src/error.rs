//! Publisher error types.

use thiserror::Error;

/// Errors that can occur while publishing telemetry.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish error: {0}")]
    Publish(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias for publish results.
pub type PublishResult<T> = Result<T, PublishError>;
