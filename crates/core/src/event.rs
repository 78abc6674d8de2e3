//! Domain event system: decoupled observation of the agent loop.
//!
//! The session publishes an event at each step of a turn. Subscribers (the
//! CLI's debug view, tests) react without the loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model answered one request
    ModelCalled {
        conversation_id: String,
        model: String,
        stop_reason: String,
        input_tokens: u32,
        output_tokens: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool call was dispatched and its result appended
    ToolExecuted {
        tool_name: String,
        call_id: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A submit reached a terminal outcome
    TurnCompleted {
        conversation_id: String,
        outcome: String,
        tool_rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model's response broke the tool-use protocol
    ProtocolViolation {
        conversation_id: String,
        reason: String,
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
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
