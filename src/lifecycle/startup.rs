//! Startup orchestration.
//!
//! # Responsibilities
//! - Load configuration, falling back to defaults when the file is absent
//! - Install the metrics exporter when enabled
//! - Bind the listener, start reload sources, then serve until a signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::watcher::{spawn_periodic_reload, ConfigWatcher};
use crate::config::{load_config, ConfigError, ConfigHandle, ProxyConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::proxy::ProxyServer;

/// Fatal errors before or while serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
}

/// Process-level settings that are not part of the configuration document.
#[derive(Debug, Clone)]
pub struct StartupOptions {
    pub config_path: PathBuf,
    /// Overrides `reload.watch` when set.
    pub watch: Option<bool>,
}

/// Load `path`, or `None` when it does not exist.
pub fn load_or_default(path: &Path) -> Result<Option<ProxyConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    load_config(path).map(Some)
}

/// Run the proxy with `config` until SIGINT/SIGTERM.
pub async fn run(config: ProxyConfig, options: StartupOptions) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.proxy.bind_address(),
        max_connections = config.proxy.max_connections,
        blocked_hosts = config.block.hosts.len(),
        blocked_sites = config.block.sites.len(),
        redirects = config.redirect.len(),
        cache = config.cache,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr);
    }

    let listener = Listener::bind(&config.proxy).await?;

    let shutdown = Arc::new(Shutdown::new());
    let (watcher, updates) = ConfigWatcher::new(&options.config_path);

    if config.reload.interval_secs > 0 {
        spawn_periodic_reload(
            options.config_path.clone(),
            Duration::from_secs(config.reload.interval_secs),
            watcher.sender(),
            shutdown.subscribe(),
        );
    }

    // Dropping the guard stops the file watcher.
    let _watch_guard = if options.watch.unwrap_or(config.reload.watch) && options.config_path.exists() {
        match watcher.run() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(path = ?options.config_path, error = %e, "Config watcher unavailable");
                None
            }
        }
    } else {
        None
    };

    let server_shutdown = shutdown.subscribe();
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = ProxyServer::with_handle(ConfigHandle::new(config));
    server.run(listener, updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
