//! Outbound event channel

use drydock_api::DeliveryEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Where the engine sends its events
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DeliveryEvent);
}

/// In-process publisher backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    event_tx: broadcast::Sender<DeliveryEvent>,
}

impl BroadcastPublisher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self { event_tx }
    }

    /// Get an event receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: DeliveryEvent) {
        trace!(event = event.name(), "publishing event");
        // no receivers is fine
        let _ = self.event_tx.send(event);
    }
}
