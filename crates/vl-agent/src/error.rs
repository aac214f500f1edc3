//! Agent error types.

use thiserror::Error;

use vl_ble::TransportError;
use vl_protocol::ProtocolError;

/// Errors surfaced by the agent's connection and collection machinery.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Retries exhausted or resource resolution failed. Always followed
    /// by best-effort cleanup; never crashes the process.
    #[error("connection failure: {0}")]
    Connection(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience alias for agent results.
pub type AgentResult<T> = Result<T, AgentError>;
