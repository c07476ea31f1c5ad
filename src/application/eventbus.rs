use crate::domain::event::DomainEvent;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DomainEvent) {
        tracing::trace!(event = event.event_name(), "Publishing event");
        if let Err(e) = self.sender.send(event) {
            tracing::trace!("No subscribers for event: {}", e);
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = create_event_bus();
        let mut rx = bus.subscribe();
        bus.publish(DomainEvent::LocationIdentified {
            location: "home".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name(), "location_identified");

        // Publishing without subscribers is fine
        drop(rx);
        bus.publish(DomainEvent::NavigationFinished {
            destination: "home".to_string(),
            hops: 0,
        });
    }
}
