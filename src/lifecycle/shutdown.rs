//! Shutdown coordination for the proxy.
//!
//! The accept loop and the periodic config reload each hold a receiver; the
//! signal task triggers.

use tokio::sync::broadcast;

/// One-shot stop signal fanned out to every subscriber.
#[derive(Debug)]
pub struct Shutdown {
    notify: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }

    /// A receiver that resolves once [`trigger`](Self::trigger) is called.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Signal every current subscriber. Without subscribers this does nothing.
    pub fn trigger(&self) {
        let receivers = self.notify.send(()).unwrap_or_default();
        tracing::debug!(receivers, "Shutdown triggered");
    }

    /// Subscribers that have not been dropped yet.
    pub fn receiver_count(&self) -> usize {
        self.notify.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
