//! Agent event broadcasting.

use tokio::sync::broadcast;

use vl_protocol::status::AgentEvent;

/// Fan-out channel for connection and collection events.
///
/// Delivery is best effort: events to a channel with no receivers are
/// dropped, and lagging receivers lose the oldest events.
#[derive(Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<AgentEvent>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: AgentEvent) {
        // No receivers is fine — events are purely observational
        let _ = self.tx.send(event);
    }
}
