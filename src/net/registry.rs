//! Registry of live connections.
//!
//! # Responsibilities
//! - Record every open connection (client and origin legs)
//! - Forget a connection exactly once at teardown
//! - Let shutdown wait for the set to drain
//!
//! # Design Decisions
//! - Entries hold bookkeeping only; a connection never lives in the registry,
//!   so there is no ownership cycle with its back-reference
//! - Removal hands back the entry if it existed, making double removal a no-op

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::net::connection::{ConnectionId, ConnectionRole};

/// Bookkeeping kept for each live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: String,
    pub role: ConnectionRole,
    pub opened_at: Instant,
}

/// Shared set of live connections. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Arc<DashMap<ConnectionId, ConnectionInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly opened connection.
    pub fn register(&self, id: ConnectionId, peer: &str, role: ConnectionRole) {
        self.entries.insert(
            id,
            ConnectionInfo {
                peer: peer.to_string(),
                role,
                opened_at: Instant::now(),
            },
        );
    }

    /// Remove a connection. Returns `None` if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.entries.remove(&id).map(|(_, info)| info)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live connections with the given role.
    pub fn count_role(&self, role: ConnectionRole) -> usize {
        self.entries.iter().filter(|e| e.value().role == role).count()
    }

    /// Wait until every connection is gone or `timeout` elapses.
    ///
    /// Returns `true` if the registry drained.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            // Check periodically
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}
