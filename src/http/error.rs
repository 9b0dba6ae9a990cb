//! Codec error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::net::ConnectionError;

/// Plaintext bodies sent back to the client when a request is refused.
pub mod messages {
    pub const INVALID_REQUEST: &str = "Invalid request";
    pub const INVALID_URL: &str = "Invalid url";
    pub const INVALID_CONTENT_LENGTH: &str = "Invalid Content-Length";
    pub const CLIENT_BLOCKED: &str = "Not allowed";
    pub const SITE_BLOCKED: &str = "Site not allowed";
    pub const SERVER_UNAVAILABLE: &str = "Server is unavailable";
}

/// Errors raised while parsing an HTTP message from a connection.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed request line {0:?}")]
    InvalidRequestLine(String),

    #[error("malformed header line {0:?}")]
    InvalidHeader(String),

    #[error("more than {0} header fields")]
    TooManyHeaders(usize),

    #[error("invalid request target {target:?}: {reason}")]
    InvalidUrl { target: String, reason: String },

    #[error("missing or invalid Content-Length")]
    InvalidContentLength,

    #[error("malformed status line {0:?}")]
    InvalidStatusLine(String),

    /// The peer did not deliver a complete message in time.
    #[error("no complete message within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl CodecError {
    /// Body for the error response, or `None` when the peer is already gone.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            CodecError::InvalidRequestLine(_)
            | CodecError::InvalidHeader(_)
            | CodecError::TooManyHeaders(_)
            | CodecError::InvalidStatusLine(_) => Some(messages::INVALID_REQUEST),
            CodecError::InvalidUrl { .. } => Some(messages::INVALID_URL),
            CodecError::InvalidContentLength => Some(messages::INVALID_CONTENT_LENGTH),
            CodecError::Timeout(_) | CodecError::Connection(_) => None,
        }
    }
}
