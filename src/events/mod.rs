//! Event broadcast for observers outside the transport path
//!
//! A fire-and-forget broadcast bus: ingest loops publish every captured
//! frame and lifecycle transitions here for monitoring UIs. A slow or
//! absent subscriber never slows the ingest path; lagging subscribers
//! simply miss events.

pub mod types;

pub use types::RelayEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus for relay events
///
/// Cloning shares the underlying channel, so a clone handed to an ingest
/// loop publishes to the same subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// With no active subscribers the event is silently dropped; events
    /// are at-most-once notifications.
    pub fn publish(&self, event: RelayEvent) {
        // send returns Err when nobody is listening, which is normal
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(RelayEvent::StreamStarted {
            source_id: "drone-1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RelayEvent::StreamStarted { .. }));
    }

    #[tokio::test]
    async fn test_frame_event_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(RelayEvent::Frame {
            source_id: "drone-1".to_string(),
            frame: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
            timestamp: Utc::now(),
        });

        assert!(matches!(rx1.recv().await.unwrap(), RelayEvent::Frame { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), RelayEvent::Frame { .. }));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        // Must not panic or block
        bus.publish(RelayEvent::SourceDisconnected {
            source_id: "drone-1".to_string(),
        });
    }
}
