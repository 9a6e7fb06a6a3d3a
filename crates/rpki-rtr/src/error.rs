//! Error types for the server.

use std::path::PathBuf;

use rpki_rtr_core::ParseError;
use rpki_rtr_session::SessionError;
use thiserror::Error;

/// Errors from a validation source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source is not valid JSON of the expected shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A record could not be turned into an announcement.
    #[error("invalid record {record}: {reason}")]
    Invalid { record: String, reason: ParseError },
}

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A router session failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The validation source failed.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// The configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
