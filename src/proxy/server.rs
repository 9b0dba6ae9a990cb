//! Accept loop.
//!
//! # Responsibilities
//! - Wrap each accepted socket in a registered client `Connection`
//! - Spawn one dispatcher task per connection, holding its admission permit
//! - Apply configuration updates to the shared snapshot
//! - On shutdown, stop accepting and wait for live connections to drain

use tokio::sync::{broadcast, mpsc};

use crate::cache::ResponseCache;
use crate::config::{ConfigHandle, ProxyConfig};
use crate::net::{Connection, ConnectionRole, Listener, ListenerError, Registry};
use crate::proxy::dispatcher::Dispatcher;
use crate::proxy::upstream::Upstream;

/// The forward proxy: shared state plus the accept loop.
pub struct ProxyServer {
    config: ConfigHandle,
    cache: ResponseCache,
    registry: Registry,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_handle(ConfigHandle::new(config))
    }

    /// Share an existing configuration handle, e.g. one a reloader also holds.
    pub fn with_handle(config: ConfigHandle) -> Self {
        Self {
            config,
            cache: ResponseCache::new(),
            registry: Registry::new(),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config
    }

    /// Accept until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy server starting");
        }

        let follower = self.config.follow(config_updates);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let _ = stream.set_nodelay(true);
                        let client = Connection::new(stream, peer.to_string(), ConnectionRole::Client, self.registry.clone());
                        let config = self.config.snapshot();
                        let upstream = Upstream::new(
                            self.registry.clone(),
                            config.timeouts.connect(),
                            config.timeouts.request(),
                        );
                        let dispatcher = Dispatcher::new(client, config, self.cache.clone(), upstream);
                        tokio::spawn(async move {
                            dispatcher.run().await;
                            drop(permit);
                        });
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
            }
        }

        follower.abort();
        drop(listener);

        let grace = self.config.snapshot().timeouts.shutdown_grace();
        if self.registry.wait_until_empty(grace).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                clients = self.registry.count_role(ConnectionRole::Client),
                origins = self.registry.count_role(ConnectionRole::Origin),
                grace_secs = grace.as_secs(),
                "Shutdown grace period elapsed with connections still open"
            );
        }
        tracing::info!("Proxy server stopped");
        Ok(())
    }
}
