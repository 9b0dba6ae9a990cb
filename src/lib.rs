//! Forward HTTP proxy library.
//!
//! Plain HTTP requests are forwarded as HTTP/1.0, CONNECT requests become
//! opaque tunnels, and GET/HEAD responses can be cached and revalidated with
//! `If-Modified-Since`. Client and site blocking and host:port redirects are
//! driven by a hot-reloadable configuration.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod proxy;

// Request handling policies
pub mod cache;
pub mod policy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use proxy::ProxyServer;
