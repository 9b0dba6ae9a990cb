//! HTTP message codec.
//!
//! # Data Flow
//! ```text
//! Connection (raw bytes)
//!     → request.rs (request line, headers, POST body)
//!         → target.rs (absolute / authority / origin form)
//!         → headers.rs (first-colon split, last value wins)
//!     → [dispatcher applies policy, picks tunnel/cache/forward]
//!     → request.rs (serialize in origin-form for the origin)
//!     → response.rs (parse origin reply, serialize for the client)
//! ```
//!
//! # Design Decisions
//! - No buffered framing layer: lines are read byte by byte from the
//!   connection so the stream is never over-read
//! - Only `Content-Length` framing; no chunked transfer-encoding

pub mod error;
pub mod headers;
pub mod request;
pub mod response;
pub mod target;

pub use error::{messages, CodecError};
pub use headers::Headers;
pub use request::HttpRequest;
pub use response::HttpResponse;
pub use target::RequestTarget;

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Longest request line, status line or header line accepted.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Most header fields accepted in one message.
pub const MAX_HEADERS: usize = 128;
