//! Header block parsing and serialization.
//!
//! Keys are kept exactly as received: no case folding, and a repeated key
//! overwrites the earlier value.

use std::collections::HashMap;

use crate::http::error::CodecError;
use crate::http::{CRLF, MAX_HEADERS, MAX_LINE_BYTES};
use crate::net::Connection;

/// Header mapping. Insertion order is not preserved.
pub type Headers = HashMap<String, String>;

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const HOST: &str = "Host";

/// Split `Key: value` on the first colon and left-trim the value.
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim_start().to_string()))
}

/// Read header lines up to and including the blank line.
pub async fn read_headers(conn: &Connection) -> Result<Headers, CodecError> {
    let mut headers = Headers::new();
    let mut count = 0usize;
    loop {
        let line = conn.read_until_clean(CRLF, MAX_LINE_BYTES).await?;
        if line.is_empty() {
            return Ok(headers);
        }

        count += 1;
        if count > MAX_HEADERS {
            return Err(CodecError::TooManyHeaders(MAX_HEADERS));
        }

        let line = String::from_utf8_lossy(&line);
        let (key, value) =
            parse_header_line(&line).ok_or_else(|| CodecError::InvalidHeader(line.to_string()))?;
        headers.insert(key, value);
    }
}

/// Append `Key: Value\r\n` for each header, then the blank line.
pub fn write_headers(out: &mut Vec<u8>, headers: &Headers) {
    for (key, value) in headers {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(CRLF);
}

/// `Content-Length` as a byte count, if present and numeric.
pub fn content_length(headers: &Headers) -> Option<usize> {
    headers.get(CONTENT_LENGTH)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_colon() {
        assert_eq!(
            parse_header_line("Host: a.com:8080"),
            Some(("Host".into(), "a.com:8080".into()))
        );
        assert_eq!(parse_header_line("X-Empty:"), Some(("X-Empty".into(), String::new())));
        assert_eq!(parse_header_line("X-Tight:value "), Some(("X-Tight".into(), "value ".into())));
        assert_eq!(parse_header_line("no colon here"), None);
        assert_eq!(parse_header_line(": value"), None);
    }

    #[test]
    fn content_length_is_case_sensitive() {
        let mut headers = Headers::new();
        headers.insert("content-length".into(), "5".into());
        assert_eq!(content_length(&headers), None);

        headers.insert(CONTENT_LENGTH.into(), " 12 ".into());
        assert_eq!(content_length(&headers), Some(12));

        headers.insert(CONTENT_LENGTH.into(), "twelve".into());
        assert_eq!(content_length(&headers), None);
    }
}
