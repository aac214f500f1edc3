//! BLE transport error types.

use thiserror::Error;

/// Errors that can occur during BLE transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("BLE adapter unavailable: {0}")]
    Adapter(String),

    #[error("scan failed: {0}")]
    Scan(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    #[error("notification channel closed")]
    ChannelClosed,
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;
