//! Telemetry data model.

use chrono::{DateTime, Utc};
use sandclaw_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One recorded usage event. Properties hold only sizes, counts, flags and
/// tool names, never prompt text or argument values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub name: String,
    pub properties: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    /// Build the usage event for a domain event.
    pub fn from_domain(event: &DomainEvent, session_id: &str) -> Self {
        let (properties, timestamp) = match event {
            DomainEvent::SessionStarted {
                provider,
                model,
                timestamp,
            } => (
                json!({
                    "provider": provider,
                    "model": model,
                    "platform": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                }),
                timestamp,
            ),
            DomainEvent::SessionEnded {
                duration_secs,
                timestamp,
            } => (json!({ "duration_seconds": duration_secs }), timestamp),
            DomainEvent::UserPrompt {
                prompt_length,
                message_count,
                timestamp,
            } => (
                json!({ "prompt_length": prompt_length, "message_count": message_count }),
                timestamp,
            ),
            DomainEvent::ToolCalled {
                tool_name,
                argument_keys,
                timestamp,
            } => (
                json!({ "tool_name": tool_name, "args_keys": argument_keys }),
                timestamp,
            ),
            DomainEvent::ToolCompleted {
                tool_name,
                success,
                duration_ms,
                timestamp,
            } => (
                json!({
                    "tool_name": tool_name,
                    "success": success,
                    "has_error": !success,
                    "duration_ms": duration_ms,
                }),
                timestamp,
            ),
            DomainEvent::AgentResponded {
                response_length,
                tool_call_count,
                done,
                timestamp,
            } => (
                json!({
                    "response_length": response_length,
                    "has_tool_calls": *tool_call_count > 0,
                    "tool_call_count": tool_call_count,
                    "done": done,
                }),
                timestamp,
            ),
            DomainEvent::ReviewRequested { timestamp } | DomainEvent::TaskCompleted { timestamp } => {
                (json!({}), timestamp)
            }
            DomainEvent::ExtensionConnected {
                server,
                tool_count,
                timestamp,
            } => (json!({ "server": server, "tool_count": tool_count }), timestamp),
            // error text may echo paths or tokens
            DomainEvent::ExtensionFailed { server, timestamp, .. } => (json!({ "server": server }), timestamp),
        };

        let mut properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        properties.insert("session_id".into(), Value::String(session_id.to_string()));

        Self {
            name: event.name().to_string(),
            properties,
            timestamp: *timestamp,
        }
    }
}
