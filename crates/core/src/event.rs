//! Telemetry events: fire-and-forget records of what the pipeline did.
//!
//! The core never reads events back. Sinks decide what to do with them:
//! log through `tracing`, fan out over a broadcast channel, or drop them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A named telemetry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event name, e.g. `PROMPT_TO_EXECUTE`
    pub name: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Sink for telemetry events.
pub trait EventLog: Send + Sync {
    fn log_event(&self, name: &str, payload: serde_json::Value);
}

/// Emits every event as a `tracing` info event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn log_event(&self, name: &str, payload: serde_json::Value) {
        tracing::info!(event = name, payload = %payload, "telemetry");
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentEventLog;

impl EventLog for SilentEventLog {
    fn log_event(&self, _name: &str, _payload: serde_json::Value) {}
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventLog for EventBus {
    fn log_event(&self, name: &str, payload: serde_json::Value) {
        self.publish(DomainEvent {
            name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.log_event("PROMPT_TO_EXECUTE", serde_json::json!({"prompt": "hi"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "PROMPT_TO_EXECUTE");
        assert_eq!(event.payload["prompt"], "hi");
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.log_event("PROMPT_EXECUTED", serde_json::Value::Null);
        SilentEventLog.log_event("ignored", serde_json::Value::Null);
    }
}
