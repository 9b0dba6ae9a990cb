//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → snapshot.rs (Arc swapped atomically)
//!
//! On file change or reload tick:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of Arc<ProxyConfig>
//!     → handlers started afterwards observe the new config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - A failed reload keeps the previous configuration

pub mod loader;
pub mod schema;
pub mod snapshot;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BlockConfig, HostPort, ListenerConfig, ObservabilityConfig, ProxyConfig, RedirectRule,
    ReloadConfig, TimeoutConfig, DEFAULT_HTTP_PORT,
};
pub use snapshot::ConfigHandle;
