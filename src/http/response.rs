//! Response parsing and serialization.
//!
//! # Responsibilities
//! - Parse an origin's status line and header block
//! - Read a body framed by `Content-Length`, tolerating a bad or missing value
//! - Build the proxy's own responses (errors, CONNECT acknowledgement)
//!
//! # Design Decisions
//! - A misbehaving origin never fails the client-facing parse: no usable
//!   `Content-Length` means an empty body
//! - Responses to HEAD, and 1xx/204/304, carry no body on the wire

use crate::http::error::CodecError;
use crate::http::headers::{self, content_length, Headers, CONTENT_LENGTH};
use crate::http::{CRLF, MAX_LINE_BYTES};
use crate::net::Connection;

/// A parsed HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Read one response to a request made with `request_method`.
    pub async fn read_from(conn: &Connection, request_method: &str) -> Result<Self, CodecError> {
        let line = conn.read_until_clean(CRLF, MAX_LINE_BYTES).await?;
        let line = String::from_utf8_lossy(&line).into_owned();

        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        let status = parts.next().and_then(|s| s.parse::<u16>().ok());
        let reason = parts.next().unwrap_or_default();
        let Some(status) = status.filter(|_| version.starts_with("HTTP/")) else {
            return Err(CodecError::InvalidStatusLine(line));
        };

        let headers = headers::read_headers(conn).await?;

        let body = match content_length(&headers) {
            Some(length) if Self::has_body(status, request_method) => conn.read_exact(length).await?,
            Some(_) => Vec::new(),
            None => {
                if headers.contains_key(CONTENT_LENGTH) {
                    tracing::debug!(
                        peer = conn.peer(),
                        value = headers.get(CONTENT_LENGTH).map(String::as_str).unwrap_or_default(),
                        "Ignoring invalid Content-Length from origin"
                    );
                }
                Vec::new()
            }
        };

        Ok(Self {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers,
            body,
        })
    }

    /// Whether a response with `status` to `request_method` has a body on the wire.
    pub fn has_body(status: u16, request_method: &str) -> bool {
        request_method != "HEAD" && !(100..200).contains(&status) && status != 204 && status != 304
    }

    /// A `text/plain` response generated by the proxy itself.
    pub fn plain_text(status: u16, reason: &str, body: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());
        headers.insert(CONTENT_LENGTH.to_string(), body.len().to_string());
        Self {
            version: "HTTP/1.0".to_string(),
            status,
            reason: reason.to_string(),
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    /// The acknowledgement written before a CONNECT tunnel starts relaying.
    pub fn connection_established() -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status: 200,
            reason: "Connection established".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(self.version.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.status.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.reason.as_bytes());
        out.extend_from_slice(CRLF);
        headers::write_headers(&mut out, &self.headers);
        out.extend_from_slice(&self.body);
        out
    }
}
