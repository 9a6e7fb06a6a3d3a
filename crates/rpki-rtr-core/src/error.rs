//! Error types for the RTR core.

use thiserror::Error;

use crate::pdu::ErrorCode;

/// Errors produced when decoding a PDU from wire bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Bad header, bad length field, truncated or over-length input.
    #[error("malformed PDU: {0}")]
    Malformed(String),

    /// Version byte is neither 0 nor 1.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// PDU type is unknown, or not defined for the PDU's protocol version.
    #[error("unsupported PDU type {pdu_type} for protocol version {version}")]
    UnsupportedPduType { pdu_type: u8, version: u8 },
}

impl DecodeError {
    /// The error code reported to the peer in an Error Report PDU.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DecodeError::Malformed(_) => ErrorCode::CorruptData,
            DecodeError::UnsupportedVersion(_) => ErrorCode::UnsupportedProtocolVersion,
            DecodeError::UnsupportedPduType { .. } => ErrorCode::UnsupportedPduType,
        }
    }
}

/// Errors produced when encoding a PDU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("PDU type {pdu_type} is not defined for protocol version {version}")]
    UnsupportedPduType { pdu_type: u8, version: u8 },

    #[error("PDU too large: {0} bytes")]
    TooLarge(usize),
}

/// Errors produced when parsing announcements, prefixes and ASNs from text
/// or building them from raw parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid ASN: {0}")]
    InvalidAsn(String),

    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("prefix length {length} exceeds {max} for address family")]
    PrefixLengthOutOfRange { length: u8, max: u8 },

    #[error("maximum length {max_length} must be between prefix length {length} and {limit}")]
    MaxLengthOutOfRange { max_length: u8, length: u8, limit: u8 },
}

/// Result type for decoding.
pub type Result<T> = std::result::Result<T, DecodeError>;
