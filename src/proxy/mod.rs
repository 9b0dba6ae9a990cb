//! Proxy engine.
//!
//! # Data Flow
//! ```text
//! server.rs (accept, admission permit, config snapshot)
//!     → dispatcher.rs (filter → parse → redirect → route)
//!         → tunnel.rs (CONNECT: byte relay in both directions)
//!         → cache (GET/HEAD: revalidate a stored entry)
//!         → upstream.rs (forward as HTTP/1.0, one exchange per origin connection)
//!     → response written, connections torn down
//! ```
//!
//! # Design Decisions
//! - One task per client connection, two more per tunnel
//! - No keep-alive on either side: one request per client connection
//! - No retries; an unreachable origin is reported once and the connection closed

pub mod dispatcher;
pub mod server;
pub mod tunnel;
pub mod upstream;

pub use dispatcher::{Dispatcher, Stage};
pub use server::ProxyServer;
pub use upstream::Upstream;
