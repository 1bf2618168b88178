//! Error types for the rill wire format.
//!
//! All errors are structured, cloneable, and comparable, so a single
//! decode failure can be broadcast to several waiting tasks and asserted
//! on exactly in tests. I/O causes are carried as strings for the same
//! reason (`std::io::Error` is neither `Clone` nor `PartialEq`).

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Underlying I/O failure, including short reads
    #[error("i/o error: {0}")]
    Io(String),

    /// A boolean byte was neither `0x00` nor `0x01`
    #[error("invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),

    /// A length-prefixed string that is not valid UTF-8
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// A channel phase tag outside the known lifecycle set
    #[error("invalid phase tag: {0}")]
    InvalidPhase(u8),

    /// Message tag with no registered decoder
    #[error("unknown message type: {0:#04x}")]
    UnknownMsgType(u8),

    /// Message payload exceeds the maximum allowed size
    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MsgTooLarge {
        /// Actual payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// A message decoder consumed fewer bytes than the frame carried
    #[error("trailing bytes after decode: {0} bytes left over")]
    TrailingBytes(usize),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}

/// Convenient Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
