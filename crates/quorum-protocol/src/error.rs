//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Buffer ended before the declared field did
    #[error("buffer too small: field needs {needed} bytes, {remaining} remain")]
    ShortBuffer { needed: usize, remaining: usize },

    /// Unknown operation code
    #[error("unknown opcode: {0}")]
    UnknownOpcode(i32),

    /// Unknown watch event type
    #[error("unknown event type: {0}")]
    UnknownEventType(i32),

    /// Unknown create mode flag
    #[error("unknown create mode: {0}")]
    UnknownCreateMode(i32),

    /// Negative length prefix on a field that cannot be null
    #[error("invalid negative length prefix: {0}")]
    InvalidLength(i32),

    /// String field is not valid UTF-8
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// Frame exceeds maximum size
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
