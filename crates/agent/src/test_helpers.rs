//! Shared test helpers for agent loop tests.

use sandclaw_core::error::ProviderError;
use sandclaw_core::message::{Message, ToolCallRequest};
use sandclaw_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. Once the
/// queue is empty it fails with a network error.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("no more scripted responses".into()))
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Create a response that only requests tool calls.
pub fn make_tool_call_response(tool_calls: Vec<ToolCallRequest>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls(None, tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call with id `call_<name>`.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(format!("call_{name}"), name, args.to_string())
}
