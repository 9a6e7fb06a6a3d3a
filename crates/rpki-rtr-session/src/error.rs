//! Error types for router sessions.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use rpki_rtr_core::{DecodeError, EncodeError, ErrorCode};

/// Errors that end a router session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The router sent bytes that do not form a valid PDU.
    #[error("decode error: {error}")]
    Decode {
        error: DecodeError,
        /// The bytes that failed to decode, as far as they were read.
        offending: Bytes,
    },

    /// A PDU could not be encoded for the negotiated version.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The router violated the protocol; an Error Report was sent.
    #[error("protocol error ({code:?}): {text}")]
    Protocol { code: ErrorCode, text: String },

    /// The router sent an Error Report.
    #[error("router reported error ({code:?}): {text}")]
    PeerError { code: ErrorCode, text: String },

    /// No request arrived within the idle timeout.
    #[error("idle timeout after {0:?}")]
    IdleTimeout(Duration),
}

impl SessionError {
    /// True for failures caused by the router rather than the transport.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SessionError::Decode { .. } | SessionError::Protocol { .. }
        )
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
