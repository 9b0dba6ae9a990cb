//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net, http, cache, proxy:
//!     → logging.rs (tracing events keyed by connection_id)
//!     → metrics.rs (counters and gauges, Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Log fields are structured (`connection_id`, `peer`, `target_uri`)
//! - Metrics are opt-in; calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
