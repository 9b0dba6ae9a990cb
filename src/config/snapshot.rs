//! Atomically swappable configuration snapshot.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::schema::ProxyConfig;

/// Shared handle to the active configuration.
///
/// Handlers call [`snapshot`](Self::snapshot) once when they start and keep
/// that `Arc` for their whole lifetime, so a reload never changes the rules a
/// request is evaluated against halfway through.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<ProxyConfig>>,
}

impl ConfigHandle {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// The active configuration.
    pub fn snapshot(&self) -> Arc<ProxyConfig> {
        self.inner.load_full()
    }

    /// Install a new configuration for subsequent snapshots.
    pub fn replace(&self, config: ProxyConfig) {
        tracing::info!(
            blocked_hosts = config.block.hosts.len(),
            blocked_sites = config.block.sites.len(),
            redirects = config.redirect.len(),
            cache = config.cache,
            "Configuration updated"
        );
        self.inner.store(Arc::new(config));
    }

    /// Apply every configuration received on `updates` until the sender goes away.
    pub fn follow(&self, mut updates: mpsc::UnboundedReceiver<ProxyConfig>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                handle.replace(config);
            }
        })
    }
}
