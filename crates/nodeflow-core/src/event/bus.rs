//! Broadcast event bus for distributing `EngineEvent` to subscribers.
//!
//! Built on `tokio::sync::broadcast`. Publishing with no active subscribers
//! is a no-op, so the engine never blocks or fails on observers.

use nodeflow_types::event::EngineEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus for run and node lifecycle events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// Lagging or absent subscribers never affect the publisher.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_types::result::WorkflowStatus;
    use uuid::Uuid;

    fn sample_event(run_id: Uuid) -> EngineEvent {
        EngineEvent::RunFinished {
            run_id,
            status: WorkflowStatus::Completed,
            duration_ms: 5,
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let run_id = Uuid::now_v7();

        bus.publish(sample_event(run_id));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id(), run_id);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.publish(sample_event(Uuid::now_v7()));
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new(16);
        let other = bus.clone();
        let mut rx = bus.subscribe();

        other.publish(sample_event(Uuid::now_v7()));
        assert!(rx.recv().await.is_ok());
    }
}
