//! Change-notification bus.
//!
//! Every subscriber sees every event; filtering happens on the receiving
//! side. Dropping the last [`EventBus`] clone closes the channel, which
//! watchers treat as the end of their stream; watchers themselves only keep
//! a [`WeakEventBus`].

use std::sync::{Arc, Weak};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Linked,
    Unlinked,
    Accessed,
    ScoreUpdated,
    Removed,
}

/// A raw change notification as published by producers.
///
/// Every field but `kind` may be missing on the wire; consumers decide what
/// an incomplete event means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// New score, for `ScoreUpdated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, uri: impl Into<String>) -> Self {
        Self {
            kind,
            uri: Some(uri.into()),
            agent: None,
            activity: None,
            timestamp: Some(Utc::now().timestamp()),
            score: None,
        }
    }

    pub fn linked(uri: impl Into<String>, agent: &str, activity: &str) -> Self {
        Self::new(ChangeKind::Linked, uri)
            .with_agent(agent)
            .with_activity(activity)
    }

    pub fn unlinked(uri: impl Into<String>, agent: &str, activity: &str) -> Self {
        Self::new(ChangeKind::Unlinked, uri)
            .with_agent(agent)
            .with_activity(activity)
    }

    pub fn score_updated(uri: impl Into<String>, agent: &str, activity: &str, score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::new(ChangeKind::ScoreUpdated, uri)
                .with_agent(agent)
                .with_activity(activity)
        }
    }

    pub fn removed(uri: impl Into<String>, agent: &str, activity: &str) -> Self {
        Self::new(ChangeKind::Removed, uri)
            .with_agent(agent)
            .with_activity(activity)
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ChangeEvent>>,
}

/// A bus reference that does not keep the channel open.
#[derive(Debug, Clone)]
pub struct WeakEventBus {
    sender: Weak<broadcast::Sender<ChangeEvent>>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.sender.upgrade().map(|sender| EventBus { sender })
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            sender: Arc::downgrade(&self.sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Deliver an event to every current subscriber. Returns how many
    /// received it; with no subscribers the event is dropped.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        trace!(kind = ?event.kind, uri = ?event.uri, "Publishing change event");
        self.sender.send(event).unwrap_or(0)
    }

    /// Decode and deliver a JSON payload from an out-of-process producer.
    ///
    /// Undecodable payloads are logged and dropped.
    pub fn publish_json(&self, payload: &str) -> usize {
        match serde_json::from_str::<ChangeEvent>(payload) {
            Ok(event) => self.publish(event),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable change event");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::{timeout, Duration};
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = ChangeEvent::linked("test://a", ":global", "act-1");
        assert_eq!(bus.publish(event.clone()), 2);

        let first = timeout(Duration::from_millis(100), rx1.recv())
            .await
            .expect("timeout")
            .expect("recv");
        let second = rx2.recv().await.expect("recv");
        assert_eq!(first, event);
        assert_eq!(second, event);
    }

    #[tokio::test]
    async fn test_dropping_last_bus_closes_channel() {
        let bus = EventBus::new(8);
        let weak = bus.downgrade();
        let mut rx = bus.subscribe();

        assert!(weak.upgrade().is_some());
        drop(bus);
        assert!(weak.upgrade().is_none());
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(ChangeEvent::new(ChangeKind::Accessed, "test://a")), 0);
    }

    #[tokio::test]
    async fn test_publish_json_accepts_partial_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        assert_eq!(
            bus.publish_json(r#"{"kind":"score_updated","uri":"test://a","score":2.5}"#),
            1
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::ScoreUpdated);
        assert_eq!(event.uri.as_deref(), Some("test://a"));
        assert_eq!(event.score, Some(2.5));
        assert_eq!(event.agent, None);
        assert_eq!(event.timestamp, None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_publish_json_drops_garbage() {
        let bus = EventBus::new(8);
        let _rx = bus.subscribe();

        assert_eq!(bus.publish_json(r#"{"kind":"exploded"}"#), 0);
        assert_eq!(bus.publish_json("not json"), 0);
        assert!(logs_contain("Dropping undecodable change event"));
    }
}
