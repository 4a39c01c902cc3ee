//! Domain event system: lets observers follow an exchange without coupling
//! to the orchestrator.
//!
//! The CLI subscribes to print streamed text live; tests subscribe to assert
//! on ordering. Nobody is required to listen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A completion call is about to be made
    CompletionRequested {
        round: u32,
        message_count: usize,
        tool_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A content fragment arrived on a streamed completion
    ContentDelta { text: String },

    /// A tool call is about to run
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished (successfully or not)
    ToolExecuted {
        call_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The exchange produced a final reply
    ExchangeCompleted {
        rounds: u32,
        total_tokens: u32,
        timestamp: DateTime<Utc>,
    },

    /// The exchange ended in failure
    ExchangeFailed {
        rounds: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow
/// subscribers lag and lose events; publishers never block.
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
            call_id: "call_1".into(),
            tool_name: "get_current_weather".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "get_current_weather");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn publishing_without_subscribers() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ContentDelta {
            text: "nobody listening".into(),
        });
    }
}
