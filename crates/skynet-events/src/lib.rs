//! System-wide typed event bus (spec.md §4.10/§5/§12).
//!
//! All subsystems publish here; the gateway forwards published events to
//! subscribed WebSocket connections as `EventFrame`s. `dropIfSlow` is the
//! default (and only) broadcast mode: a `tokio::sync::broadcast` channel
//! already drops the oldest buffered item for a subscriber that falls
//! behind rather than blocking the publisher, which is exactly the
//! high-water-mark-eviction behavior spec.md describes — no separate
//! per-connection queue bookkeeping is needed.

mod event;

pub use event::Event;

use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 1024;

/// Central pub/sub hub. Cheap to clone (wraps an `Arc`-backed sender).
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers. A no-op if nobody is
    /// listening (mirrors the predecessor's `EventBroadcaster::send`).
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
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

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::cron_service_started());
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::cron_job_started("job-1".into(), "nightly".into()));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "cron.job-started");
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking_publisher() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for i in 0..(BUS_CAPACITY + 10) {
            bus.publish(Event::cron_job_started(format!("job-{i}"), "x".into()));
        }
        // The publisher above never blocked. The lagging subscriber's next
        // recv reports how many it missed rather than replaying the backlog.
        match rx.recv().await {
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            other => panic!("expected Lagged, got {other:?}"),
        }
    }
}
