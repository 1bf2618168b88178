//! Error types for the transport core.
//!
//! All variants are `Clone + PartialEq`: a single dial or handshake
//! failure is broadcast to every task waiting on the same registry slot,
//! and tests assert on errors exactly. I/O causes are therefore carried
//! as strings (the io-boundary conversion happens once, at the edge).
//!
//! `AlreadyClosed` is an idempotency signal, not a fault: closing a
//! resource twice, or using it after close, reports it so callers can
//! distinguish "nothing to do" from real failures.

use rill_proto::CodecError;
use thiserror::Error;

/// Errors surfaced by the transport layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Malformed wire data, unknown message tag, or oversized frame
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The identity-exchange handshake failed; no endpoint was created
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer could not be dialed
    #[error("dial failed: {0}")]
    Dial(String),

    /// Underlying connection I/O failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation on a closed endpoint, listener, or registry
    #[error("already closed")]
    AlreadyClosed,
}

impl WireError {
    /// Whether this error is the close-idempotency signal rather than a
    /// true fault.
    pub fn is_already_closed(&self) -> bool {
        matches!(self, WireError::AlreadyClosed)
    }
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Transport(err.to_string())
    }
}

/// Convenient Result type alias for transport operations
pub type Result<T> = std::result::Result<T, WireError>;
