//! Domain event system — decoupled observation of the pipeline.
//!
//! Events are published as a turn moves through its stages. Anything that
//! wants to watch (logs, dashboards, tests) subscribes without the pipeline
//! knowing about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user message entered the pipeline
    MessageReceived {
        session_id: String,
        user_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The utterance was classified
    IntentRecognized {
        session_id: String,
        intent: String,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A stage took its fallback path
    StageDegraded {
        session_id: String,
        stage: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A reply was produced
    ReplyGenerated {
        session_id: String,
        agent: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A memory was written to one or more tiers
    MemoryStored {
        session_id: String,
        memory_id: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            tool_name: "video_info".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "video_info");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::StageDegraded {
            session_id: "s".into(),
            stage: "intent".into(),
            reason: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
