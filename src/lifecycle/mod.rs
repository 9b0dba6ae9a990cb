//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Metrics → Bind listener → Reload sources → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain registry (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, listener last before serving
//! - Shutdown has a grace period; connections still open afterwards are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{load_or_default, run, StartupError, StartupOptions};
