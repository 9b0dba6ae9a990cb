//! Client-facing TCP listener with an admission cap.
//!
//! A slot is reserved before `accept` is even called, so once
//! `max_connections` handlers are running new sockets wait in the kernel
//! backlog instead of being accepted and starved.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A single failed accept; the listener itself is still usable.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    #[error("admission semaphore closed")]
    Closed,
}

/// Accepts client sockets, at most `max_connections` at a time.
pub struct Listener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind `lhost:lport` from the configuration.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = config.bind_address();
        let inner = TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        Ok(Self::new(inner, config.max_connections))
    }

    /// Wrap an already bound socket.
    pub fn new(inner: TcpListener, max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        match inner.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, max_connections, "Listening for clients"),
            Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
        }
        Self {
            inner,
            slots: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Wait for a free slot, then for a client.
    ///
    /// The returned permit is the slot; keep it for as long as the client is served.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;
        let (stream, peer) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(peer = %peer, free_slots = self.slots.available_permits(), "Accepted");
        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// One admitted client. Dropping it frees the slot, even if the handler panicked.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
