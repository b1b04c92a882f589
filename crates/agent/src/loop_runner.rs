//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use sandclaw_core::error::ProviderError;
use sandclaw_core::event::{DomainEvent, EventBus};
use sandclaw_core::message::{Message, ToolCallRequest};
use sandclaw_core::provider::{Provider, ProviderRequest};
use sandclaw_core::tool::{ToolRegistry, ToolResult};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationState, DEFAULT_MAX_HISTORY};

/// Case-insensitive phrases that mark a plain-text reply as the end of the task.
pub const DONE_PHRASES: &[&str] = &[
    "task complete",
    "task completed",
    "i'm done",
    "i am done",
    "finished",
    "all done",
];

/// Error text for tool arguments that are not valid JSON.
pub const INVALID_ARGUMENTS_JSON: &str = "Invalid JSON in tool arguments";

/// Error text for tool arguments that parse but are not an object.
pub const ARGUMENTS_NOT_OBJECT: &str = "Tool arguments must be a JSON object";

pub const DEFAULT_COMMAND_NUDGE: &str = "Hint: The command was successful. If this command modifies system state, remember to add it to the Ansible playbook using 'add_task'.";

/// Whether `content` contains one of the [`DONE_PHRASES`].
pub fn is_done(content: &str) -> bool {
    let lower = content.to_lowercase();
    DONE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Tool names the loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSignals {
    /// A successful call pauses the loop for a human
    pub review_tool: String,
    /// A successful call is followed by `command_nudge`
    pub command_tool: String,
    /// A successful call ends the task
    pub completion_tool: String,
    pub command_nudge: String,
}

impl Default for LoopSignals {
    fn default() -> Self {
        Self {
            review_tool: "request_review".into(),
            command_tool: "run_command".into(),
            completion_tool: "task_complete".into(),
            command_nudge: DEFAULT_COMMAND_NUDGE.into(),
        }
    }
}

/// Where the loop is within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    AwaitingModel,
    DispatchingTools,
}

/// The outcome of one `step()`.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    /// Set only when the model replied with plain content
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_results: Vec<ToolResult>,
    pub done: bool,
    pub awaiting_input: bool,
}

impl AgentResponse {
    /// Whether `run()` should hand control back to the caller after this turn.
    pub fn ends_run(&self) -> bool {
        self.done
            || self.awaiting_input
            || (self.tool_calls.is_empty() && self.content.as_deref().is_some_and(|c| !c.is_empty()))
    }
}

/// Drives the conversation between the model and the tools.
///
/// `step` takes `&mut self`, so one loop never has two steps in flight.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Tool registry, shared read-only
    tools: Arc<ToolRegistry>,

    conversation: ConversationState,

    temperature: Option<f32>,

    max_tokens: Option<u32>,

    /// Event bus for domain events
    events: Option<Arc<EventBus>>,

    signals: LoopSignals,

    state: LoopState,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            conversation: ConversationState::new(system_prompt, DEFAULT_MAX_HISTORY),
            temperature: None,
            max_tokens: None,
            events: None,
            signals: LoopSignals::default(),
            state: LoopState::Idle,
        }
    }

    /// Set how many non-system messages are kept.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.conversation.set_max_history(max_history);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_signals(mut self, signals: LoopSignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Append a user message and prune.
    pub fn add_user_message(&mut self, content: impl Into<String>) {
        let content = content.into();
        let prompt_length = content.chars().count();
        self.conversation.push(Message::user(content));
        self.conversation.prune();

        self.publish(DomainEvent::UserPrompt {
            prompt_length,
            message_count: self.conversation.len(),
            timestamp: Utc::now(),
        });
    }

    /// Parse the raw argument text and run the tool.
    async fn dispatch(&self, call: &ToolCallRequest) -> ToolResult {
        let parsed = match serde_json::from_str::<Value>(&call.arguments) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(ARGUMENTS_NOT_OBJECT),
            Err(_) => Err(INVALID_ARGUMENTS_JSON),
        };
        let arguments = match parsed {
            Ok(map) => map,
            Err(message) => {
                warn!(tool = %call.name, "{message}");
                self.publish(DomainEvent::ToolCompleted {
                    tool_name: call.name.clone(),
                    success: false,
                    duration_ms: 0,
                    timestamp: Utc::now(),
                });
                return ToolResult::error(&call.id, &call.name, message);
            }
        };

        self.publish(DomainEvent::ToolCalled {
            tool_name: call.name.clone(),
            argument_keys: arguments.keys().cloned().collect(),
            timestamp: Utc::now(),
        });

        let start = Instant::now();
        let payload = self.tools.execute(&call.name, arguments).await;
        let result = ToolResult::from_payload(&call.id, &call.name, payload);

        self.publish(DomainEvent::ToolCompleted {
            tool_name: call.name.clone(),
            success: !result.is_error,
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });
        result
    }

    /// Run one turn: one model call and every tool call it asks for.
    ///
    /// Tool calls run sequentially in the order the model issued them. A
    /// provider error is returned as-is and leaves the conversation without
    /// an assistant message for this turn.
    pub async fn step(&mut self) -> Result<AgentResponse, ProviderError> {
        self.state = LoopState::AwaitingModel;

        let mut request = ProviderRequest::new(
            self.model.clone(),
            self.conversation.messages().to_vec(),
            self.tools.definitions(),
        );
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(messages = request.messages.len(), tools = request.tools.len(), "Calling provider");
        let reply = match self.provider.complete(request).await {
            Ok(response) => response.message,
            Err(e) => {
                self.state = LoopState::Idle;
                warn!(provider = %self.provider.name(), error = %e, "Provider call failed");
                return Err(e);
            }
        };

        let mut response = AgentResponse::default();

        if reply.has_tool_calls() {
            self.state = LoopState::DispatchingTools;
            let calls = reply.tool_calls;
            self.conversation
                .push(Message::assistant_tool_calls(reply.content, calls.clone()));

            for call in &calls {
                let result = self.dispatch(call).await;
                self.conversation
                    .push(Message::tool_result(&call.id, result.content()));

                if !result.is_error {
                    if call.name == self.signals.review_tool {
                        info!("Review requested, waiting for human input");
                        response.awaiting_input = true;
                        self.publish(DomainEvent::ReviewRequested { timestamp: Utc::now() });
                    }
                    if call.name == self.signals.command_tool {
                        self.conversation
                            .push(Message::system(self.signals.command_nudge.clone()));
                    }
                    if call.name == self.signals.completion_tool {
                        info!("Task marked complete");
                        response.done = true;
                        self.publish(DomainEvent::TaskCompleted { timestamp: Utc::now() });
                    }
                }
                response.tool_results.push(result);
            }
            response.tool_calls = calls;
        } else {
            let content = reply.content.unwrap_or_default();
            self.conversation.push(Message::assistant(content.clone()));
            response.done = is_done(&content);
            response.content = Some(content);
        }

        self.conversation.prune();
        self.state = LoopState::Idle;

        self.publish(DomainEvent::AgentResponded {
            response_length: response.content.as_deref().map_or(0, |c| c.chars().count()),
            tool_call_count: response.tool_calls.len(),
            done: response.done,
            timestamp: Utc::now(),
        });

        Ok(response)
    }

    /// Add `user_input` and step until the agent finishes, asks for review,
    /// replies with plain content, or `max_turns` steps have run.
    pub async fn run(
        &mut self,
        user_input: impl Into<String>,
        max_turns: usize,
    ) -> Result<Vec<AgentResponse>, ProviderError> {
        self.add_user_message(user_input);

        let mut responses = Vec::new();
        for turn in 0..max_turns {
            let response = self.step().await?;
            let stop = response.ends_run();
            responses.push(response);
            if stop {
                debug!(turns = turn + 1, "Run finished");
                return Ok(responses);
            }
        }

        warn!(max_turns, "Max turns reached");
        Ok(responses)
    }

    /// Clear the conversation back to the system prompt, optionally replacing it.
    pub fn reset(&mut self, system_prompt: Option<String>) {
        self.conversation.reset(system_prompt);
        self.state = LoopState::Idle;
    }
}
