//! Policy engine.
//!
//! # Data Flow
//! ```text
//! peer address  → filter.rs (client prefix block)
//! parsed target → filter.rs (exact site block)
//!               → redirect.rs (first matching host:port rule rewrites target + Host)
//! ```
//!
//! # Design Decisions
//! - Pure functions over one configuration snapshot; no state of their own
//! - Deterministic: same snapshot and input always yield the same decision

pub mod filter;
pub mod redirect;

pub use filter::{blocked_client, blocked_site};
pub use redirect::{apply_redirect, find_redirect};
