//! Protocol error types.

use thiserror::Error;

/// Errors raised while reassembling or decoding adapter responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame length: {len} bytes in line {line:?}")]
    InvalidFrameLength { len: usize, line: String },

    #[error("unknown frame type 0x{nibble:X}")]
    UnknownFrameType { nibble: u8 },

    #[error("invalid frame sequence: expected {expected}, got {got}")]
    InvalidFrameSequence { expected: u8, got: u8 },

    #[error("invalid hex in frame line {0:?}")]
    InvalidHex(String),

    #[error("response contains no single or first frame")]
    IncompleteMessage,

    #[error("command session not attached")]
    SessionNotReady,
}

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
