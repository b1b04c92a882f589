//! Domain event system: decoupled communication between components.
//!
//! The agent loop and the extension manager publish events here; the
//! telemetry recorder (or anything else) subscribes. Events never carry
//! prompt text or argument values, only sizes, counts and names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A CLI session started
    SessionStarted {
        provider: String,
        model: String,
        timestamp: DateTime<Utc>,
    },

    /// A CLI session ended
    SessionEnded {
        duration_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// The user added a message to the conversation
    UserPrompt {
        prompt_length: usize,
        message_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The model asked for a tool
    ToolCalled {
        tool_name: String,
        argument_keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished (successfully or not)
    ToolCompleted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One agent step finished
    AgentResponded {
        response_length: usize,
        tool_call_count: usize,
        done: bool,
        timestamp: DateTime<Utc>,
    },

    /// The review tool paused the loop for a human decision
    ReviewRequested { timestamp: DateTime<Utc> },

    /// The completion tool reported the task as finished
    TaskCompleted { timestamp: DateTime<Utc> },

    /// An extension server finished its handshake
    ExtensionConnected {
        server: String,
        tool_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// An extension server could not be started
    ExtensionFailed {
        server: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Stable snake_case name, used as the telemetry event name.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::SessionStarted { .. } => "session_start",
            DomainEvent::SessionEnded { .. } => "session_end",
            DomainEvent::UserPrompt { .. } => "user_prompt",
            DomainEvent::ToolCalled { .. } => "tool_call",
            DomainEvent::ToolCompleted { .. } => "tool_result",
            DomainEvent::AgentResponded { .. } => "agent_response",
            DomainEvent::ReviewRequested { .. } => "review_requested",
            DomainEvent::TaskCompleted { .. } => "task_completed",
            DomainEvent::ExtensionConnected { .. } => "extension_connected",
            DomainEvent::ExtensionFailed { .. } => "extension_failed",
        }
    }
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
