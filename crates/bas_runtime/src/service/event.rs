//! Event bus
//!
//! Services announce state edges (alarms, link up/down) as [`Event`]s on a
//! shared broadcast bus. Listeners pick the topics they care about with a
//! glob pattern.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use wildmatch::WildMatch;

/// Events buffered per listener before the slowest one starts skipping
pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Slash separated topic, e.g. `unit/alarm-raised`
    pub topic: String,
    /// Id of the emitting service
    pub origin: String,
    pub payload: serde_json::Value,
    /// Unix milliseconds
    pub emitted_at_ms: u64,
}

impl Event {
    pub fn new(
        topic: impl Into<String>,
        origin: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        let emitted_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            topic: topic.into(),
            origin: origin.into(),
            payload,
            emitted_at_ms,
        }
    }

    /// Glob match on the topic (`*` for everything, `unit/*` for one family)
    pub fn is(&self, pattern: &str) -> bool {
        WildMatch::new(pattern).matches(&self.topic)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key)?.as_str()
    }

    pub fn num_field(&self, key: &str) -> Option<f64> {
        self.payload.get(key)?.as_f64()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver to every current listener; returns how many there were
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Listen for events whose topic matches `pattern`, from now on
    pub fn watch(&self, pattern: &str) -> Subscription {
        Subscription {
            pattern: WildMatch::new(pattern),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Filtered view of the bus
pub struct Subscription {
    pattern: WildMatch,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Wait for the next matching event. `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.pattern.matches(&event.topic) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event listener fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already buffered, without waiting
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.pattern.matches(&event.topic) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event listener fell behind");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topic_patterns() {
        let event = Event::new(
            "unit/alarm-raised",
            "bas/control-loop",
            json!({"unit_id": "rtu_1", "temperature": 86.0}),
        );

        assert!(event.is("*"));
        assert!(event.is("unit/*"));
        assert!(!event.is("unit/alarm-cleared"));
        assert!(!event.is("link/*"));

        assert_eq!(event.str_field("unit_id"), Some("rtu_1"));
        assert_eq!(event.num_field("temperature"), Some(86.0));
        assert_eq!(event.num_field("missing"), None);
    }

    #[test]
    fn test_publish_with_no_listeners() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(Event::new("link/lost", "test", json!(null))), 0);
    }

    #[tokio::test]
    async fn test_subscription_skips_other_topics() {
        let bus = EventBus::with_capacity(8);
        let mut links = bus.watch("link/*");

        bus.publish(Event::new("unit/alarm-raised", "test", json!({})));
        bus.publish(Event::new("link/connected", "test", json!({})));

        assert_eq!(links.next().await.unwrap().topic, "link/connected");
        assert!(links.try_next().is_none());
    }

    #[test]
    fn test_lagging_listener_recovers() {
        let bus = EventBus::with_capacity(2);
        let mut all = bus.watch("*");

        for i in 0..5 {
            bus.publish(Event::new(format!("tick/{}", i), "test", json!(i)));
        }

        // Oldest events were overwritten; the newest two remain
        assert_eq!(all.try_next().unwrap().topic, "tick/3");
        assert_eq!(all.try_next().unwrap().topic, "tick/4");
        assert!(all.try_next().is_none());
    }
}
