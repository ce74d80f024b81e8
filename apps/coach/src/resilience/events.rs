use tokio::sync::broadcast;

/// Published by the orchestrator after every resilient call settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// A remote call succeeded: connectivity currently works.
    Healthy { label: String },
    /// A remote call exhausted its attempts.
    Degraded { label: String },
}

/// Fan-out channel for connectivity events. Publishing never blocks and never
/// fails, even with no subscribers.
#[derive(Debug, Clone)]
pub struct ConnectivityBus {
    tx: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ConnectivityEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityBus {
    fn default() -> Self {
        Self::new(64)
    }
}
