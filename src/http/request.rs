//! Request parsing and serialization.
//!
//! # Responsibilities
//! - Parse the request line and header block byte by byte from a connection
//! - Read a POST body of exactly `Content-Length` bytes
//! - Serialize the request in origin-form for the upstream hop
//!
//! # Design Decisions
//! - Only POST carries a body; other methods ignore `Content-Length`
//! - The parsed target keeps scheme and host for routing, but they never
//!   reach the wire

use crate::http::error::CodecError;
use crate::http::headers::{self, content_length, Headers, HOST};
use crate::http::target::RequestTarget;
use crate::http::{CRLF, MAX_LINE_BYTES};
use crate::net::Connection;

/// A parsed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub target: RequestTarget,
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Read one request from a client connection.
    pub async fn read_from(conn: &Connection) -> Result<Self, CodecError> {
        let line = conn.read_until_clean(CRLF, MAX_LINE_BYTES).await?;
        let line = String::from_utf8(line)
            .map_err(|e| CodecError::InvalidRequestLine(String::from_utf8_lossy(e.as_bytes()).into_owned()))?;

        let mut parts = line.splitn(3, ' ');
        let (Some(method), Some(raw_target), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CodecError::InvalidRequestLine(line));
        };
        if !is_token(method) {
            return Err(CodecError::InvalidRequestLine(line));
        }

        let mut target = RequestTarget::parse(raw_target, method).map_err(|reason| CodecError::InvalidUrl {
            target: raw_target.to_string(),
            reason,
        })?;

        if !version.starts_with("HTTP/") {
            return Err(CodecError::InvalidRequestLine(line));
        }

        let headers = headers::read_headers(conn).await?;

        if !target.has_host() {
            if let Some(host) = headers.get(HOST) {
                target.set_host_header(host);
            }
            if !target.has_host() {
                return Err(CodecError::InvalidUrl {
                    target: raw_target.to_string(),
                    reason: "no host in target or Host header".to_string(),
                });
            }
        }

        let body = if method == "POST" {
            let length = content_length(&headers).ok_or(CodecError::InvalidContentLength)?;
            conn.read_exact(length).await?
        } else {
            Vec::new()
        };

        Ok(Self {
            method: method.to_string(),
            target,
            version: version.to_string(),
            headers,
            body,
        })
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Serialize with an origin-form target.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.origin_form().as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.version.as_bytes());
        out.extend_from_slice(CRLF);
        headers::write_headers(&mut out, &self.headers);
        out.extend_from_slice(&self.body);
        out
    }
}

/// RFC 9110 token characters.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{ConnectionRole, Registry};
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    async fn parse(raw: &[u8]) -> (Result<HttpRequest, CodecError>, Arc<Connection>) {
        let registry = Registry::new();
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        far.write_all(raw).await.unwrap();
        // Buffered bytes stay readable; a truncated message then hits end of stream.
        drop(far);
        let conn = Connection::new(near, "127.0.0.1:5000", ConnectionRole::Client, registry);
        let result = HttpRequest::read_from(&conn).await;
        (result, conn)
    }

    #[tokio::test]
    async fn parses_absolute_form_get() {
        let (req, _) = parse(b"GET http://a.com/x?y=1 HTTP/1.1\r\nHost: a.com\r\nAccept: */*\r\n\r\n").await;
        let req = req.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target.host, "a.com");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.header("Accept"), Some("*/*"));
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn post_reads_exact_body() {
        let (req, _) = parse(b"POST http://a.com/f HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").await;
        assert_eq!(req.unwrap().body, b"hello");
    }

    #[tokio::test]
    async fn post_without_length_is_rejected() {
        let (req, _) = parse(b"POST http://a.com/f HTTP/1.1\r\nHost: a.com\r\n\r\nhello").await;
        let err = req.unwrap_err();
        assert!(matches!(err, CodecError::InvalidContentLength));
        assert_eq!(err.client_message(), Some("Invalid Content-Length"));

        let (req, _) = parse(b"POST http://a.com/f HTTP/1.1\r\nContent-Length: abc\r\n\r\n").await;
        assert!(matches!(req.unwrap_err(), CodecError::InvalidContentLength));
    }

    #[tokio::test]
    async fn get_ignores_content_length() {
        let (req, _) = parse(b"GET http://a.com/ HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").await;
        assert!(req.unwrap().body.is_empty());
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let (req, _) = parse(b"GET mailto:x@y HTTP/1.1\r\n\r\n").await;
        let err = req.unwrap_err();
        assert_eq!(err.client_message(), Some("Invalid url"));
    }

    #[tokio::test]
    async fn non_http_scheme_is_invalid_url() {
        for line in [&b"GET https://a.com:443/x HTTP/1.1\r\n\r\n"[..], b"GET ftp://a.com/f HTTP/1.1\r\n\r\n"] {
            let (req, _) = parse(line).await;
            let err = req.unwrap_err();
            assert!(matches!(err, CodecError::InvalidUrl { .. }));
            assert_eq!(err.client_message(), Some("Invalid url"));
        }
    }

    #[tokio::test]
    async fn target_is_forwarded_verbatim() {
        let (req, _) = parse(b"GET http://a.com:80/a/../b{c}?k=%7e HTTP/1.1\r\n\r\n").await;
        let wire = req.unwrap().to_bytes();
        assert!(wire.starts_with(b"GET /a/../b{c}?k=%7e HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn malformed_request_line() {
        let (req, _) = parse(b"GARBAGE\r\n\r\n").await;
        assert_eq!(req.unwrap_err().client_message(), Some("Invalid request"));

        let (req, _) = parse(b"GET http://a.com/ FTP/1.0\r\n\r\n").await;
        assert_eq!(req.unwrap_err().client_message(), Some("Invalid request"));
    }

    #[tokio::test]
    async fn duplicate_header_last_wins() {
        let (req, _) = parse(b"GET http://a.com/ HTTP/1.1\r\nX-A: 1\r\nX-A: 2\r\nx-a: 3\r\n\r\n").await;
        let req = req.unwrap();
        assert_eq!(req.header("X-A"), Some("2"));
        assert_eq!(req.header("x-a"), Some("3"));
    }

    #[tokio::test]
    async fn origin_form_takes_host_header() {
        let (req, _) = parse(b"GET /index HTTP/1.1\r\nHost: a.com:8000\r\n\r\n").await;
        let req = req.unwrap();
        assert_eq!(req.target.host, "a.com");
        assert_eq!(req.target.port, Some(8000));

        let (req, _) = parse(b"GET /index HTTP/1.1\r\n\r\n").await;
        assert_eq!(req.unwrap_err().client_message(), Some("Invalid url"));
    }

    #[tokio::test]
    async fn truncated_request_is_connection_error() {
        let (req, conn) = parse(b"GET http://a.com/ HTTP/1.1\r\nHost: a").await;
        let err = req.unwrap_err();
        assert!(matches!(err, CodecError::Connection(_)));
        assert_eq!(err.client_message(), None);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn serialize_round_trip() {
        let (req, _) = parse(
            b"POST http://a.com:8080/api?q=1 HTTP/1.1\r\nHost: a.com:8080\r\nContent-Length: 4\r\nX-Token: abc\r\n\r\nbody",
        )
        .await;
        let req = req.unwrap();
        let wire = req.to_bytes();
        assert!(wire.starts_with(b"POST /api?q=1 HTTP/1.1\r\n"));

        // The serialized bytes parse back to the same message.
        let text = String::from_utf8(wire.clone()).unwrap();
        let absolute = text.replacen("/api?q=1", "http://a.com:8080/api?q=1", 1);
        let (again, _) = parse(absolute.as_bytes()).await;
        let again = again.unwrap();
        assert_eq!(again.method, req.method);
        assert_eq!(again.version, req.version);
        assert_eq!(again.headers, req.headers);
        assert_eq!(again.body, req.body);
    }
}
