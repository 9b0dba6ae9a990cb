//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! cachable request (GET/HEAD, no Range)
//!     → store.rs (exact-target lookup)
//!     → revalidate.rs (If-Modified-Since round trip to the origin)
//!     → 304: cached entry / other: fresh entry replaces cached one
//!
//! Forwarded responses are written back through store.rs.
//! ```
//!
//! # Design Decisions
//! - Locking lives inside the store; callers only see get/put
//! - No normalization of keys, no eviction (unbounded, process lifetime)

pub mod revalidate;
pub mod store;

pub use revalidate::{if_modified_since, serve_from_cache, CacheOutcome};
pub use store::{cachable, ResponseCache};
