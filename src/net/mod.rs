//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, admission cap)
//!     → connection.rs (serialized byte I/O, idempotent teardown)
//!     → registry.rs (live connection bookkeeping)
//!     → Hand off to the proxy dispatcher
//!
//! Origin legs are dialed through connection.rs as well and share the registry.
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Client and origin sockets are the same `Connection` type
//! - Teardown is the only way a connection closes

pub mod connection;
pub mod listener;
pub mod registry;

pub use connection::{Connection, ConnectionError, ConnectionId, ConnectionRole};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use registry::{ConnectionInfo, Registry};
