//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: run commands, edit
//! files, author playbooks, or forward a call to an extension server. Local
//! tools and extension proxies implement the same trait and are dispatched
//! by name through the [`ToolRegistry`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::error::{RegistryError, ToolError};
use crate::provider::ToolDefinition;

/// Named arguments passed to a tool, parsed from the model's JSON text.
pub type ToolArguments = Map<String, Value>;

/// Fallback error text for a failed result that carried no message.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// What a tool's `execute` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub success: bool,

    #[serde(default)]
    pub data: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolExecutionResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error_message: None,
        }
    }

    /// A successful result built from a JSON value. Non-object values are
    /// wrapped under `"result"`.
    pub fn ok_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::ok(map),
            other => {
                let mut map = Map::new();
                map.insert("result".into(), other);
                Self::ok(map)
            }
        }
    }

    /// A failed result with no extra data.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_with_data(message, Map::new())
    }

    /// A failed result whose `data` is merged into the error payload.
    pub fn failure_with_data(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            success: false,
            data,
            error_message: Some(message.into()),
        }
    }

    /// Flatten into the payload the model sees.
    ///
    /// Success yields `data` unchanged. Failure yields
    /// `{"error": <message>, ...data}` where keys from `data` win.
    pub fn into_payload(self) -> Value {
        if self.success {
            return Value::Object(self.data);
        }
        let mut payload = Map::new();
        payload.insert(
            "error".into(),
            Value::String(self.error_message.unwrap_or_else(|| UNKNOWN_ERROR.to_string())),
        );
        payload.extend(self.data);
        Value::Object(payload)
    }
}

/// The outcome of one tool call as recorded by the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The request this answers
    pub tool_call_id: String,

    /// Which tool ran (or was asked for)
    pub tool_name: String,

    /// Structured payload, already flattened by the registry
    pub result: Value,

    /// Whether the payload reports an error
    pub is_error: bool,
}

impl ToolResult {
    /// Wrap a registry payload, deriving `is_error` from its `error` key.
    pub fn from_payload(tool_call_id: impl Into<String>, tool_name: impl Into<String>, result: Value) -> Self {
        let is_error = payload_is_error(&result);
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result,
            is_error,
        }
    }

    /// An error result that never reached the tool.
    pub fn error(tool_call_id: impl Into<String>, tool_name: impl Into<String>, message: &str) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result: serde_json::json!({ "error": message }),
            is_error: true,
        }
    }

    /// JSON text used as the content of the tool-role message.
    pub fn content(&self) -> String {
        self.result.to_string()
    }
}

/// Whether a payload's `error` key holds a truthy value.
pub fn payload_is_error(payload: &Value) -> bool {
    match payload.get("error") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Deserialize tool arguments into a typed parameter struct.
///
/// Missing or mistyped fields become [`ToolError::InvalidArguments`].
pub fn parse_arguments<T: DeserializeOwned>(arguments: ToolArguments) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments)).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// The core Tool trait.
///
/// Every local tool and every extension proxy implements this. Tools are
/// registered in the [`ToolRegistry`] and made available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "run_command", "mcp_search").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given named arguments.
    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Management calls (`register`, `unregister`) fail fast. Dispatch through
/// [`ToolRegistry::execute`] never fails: every problem becomes an
/// `{"error": ...}` payload the model can read.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }
        debug!(tool = %name, "Registered tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Remove a tool by name, returning it.
    pub fn unregister(&mut self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        let tool = self
            .tools
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.order.retain(|n| n != name);
        Ok(tool)
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.to_definition())
            .collect()
    }

    /// Definitions in the OpenAI function-calling shape.
    pub fn openai_definitions(&self) -> Vec<Value> {
        self.definitions().iter().map(ToolDefinition::to_openai_format).collect()
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Look up and run a tool, capturing every failure as a payload.
    pub async fn execute(&self, name: &str, arguments: ToolArguments) -> Value {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Tool not found");
            return error_payload(format!("Tool '{name}' not found"));
        };

        debug!(tool = %name, "Executing tool");
        match tool.execute(arguments).await {
            Ok(result) => result.into_payload(),
            Err(ToolError::InvalidArguments(detail)) => {
                warn!(tool = %name, error = %detail, "Invalid tool arguments");
                error_payload(format!("Invalid arguments for '{name}': {detail}"))
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                error_payload(format!("Tool '{name}' failed: {e}"))
            }
        }
    }
}

fn error_payload(message: String) -> Value {
    serde_json::json!({ "error": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Returns `{echo: message}`.
    struct EchoTool;

    #[derive(Deserialize)]
    struct EchoArgs {
        message: String,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                },
                "required": ["message"]
            })
        }
        async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
            let args: EchoArgs = parse_arguments(arguments)?;
            Ok(ToolExecutionResult::ok_value(json!({ "echo": args.message })))
        }
    }

    struct ExplodingTool;

    #[async_trait]
    impl Tool for ExplodingTool {
        fn name(&self) -> &str { "explode" }
        fn description(&self) -> &str { "Always fails" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
            Err(ToolError::failed("explode", "boom"))
        }
    }

    struct DecliningTool;

    #[async_trait]
    impl Tool for DecliningTool {
        fn name(&self) -> &str { "decline" }
        fn description(&self) -> &str { "Returns success=false" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
            let mut data = Map::new();
            data.insert("attempts".into(), json!(3));
            Ok(ToolExecutionResult::failure_with_data("gave up", data))
        }
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_unknown_fails() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert!(registry.unregister("echo").is_ok());
        assert!(registry.is_empty());
        assert_eq!(
            registry.unregister("echo").err().unwrap(),
            RegistryError::NotFound("echo".into())
        );
    }

    #[test]
    fn definitions_follow_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ExplodingTool)).unwrap();
        registry.register(Arc::new(EchoTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "explode");
        assert_eq!(defs[1].name, "echo");
        assert_eq!(registry.names(), vec!["explode", "echo"]);

        let openai = registry.openai_definitions();
        assert_eq!(openai[1]["function"]["name"], "echo");
    }

    #[tokio::test]
    async fn execute_echo() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let result = registry.execute("echo", args(json!({"message": "hi"}))).await;
        assert_eq!(result, json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn execute_missing_tool_returns_error_payload() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nonexistent", Map::new()).await;
        let msg = result["error"].as_str().unwrap();
        assert!(msg.contains("not found"));
        assert!(payload_is_error(&result));
    }

    #[tokio::test]
    async fn execute_with_wrong_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let result = registry.execute("echo", args(json!({"text": "hi"}))).await;
        let msg = result["error"].as_str().unwrap();
        assert!(msg.starts_with("Invalid arguments for 'echo':"), "{msg}");
        assert!(msg.contains("message"));
    }

    #[tokio::test]
    async fn raising_and_declining_both_yield_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ExplodingTool)).unwrap();
        registry.register(Arc::new(DecliningTool)).unwrap();

        let raised = registry.execute("explode", Map::new()).await;
        assert_eq!(raised, json!({"error": "Tool 'explode' failed: boom"}));

        let declined = registry.execute("decline", Map::new()).await;
        assert_eq!(declined, json!({"error": "gave up", "attempts": 3}));

        assert!(payload_is_error(&raised));
        assert!(payload_is_error(&declined));
    }

    #[test]
    fn failure_without_message_uses_fallback() {
        let result = ToolExecutionResult {
            success: false,
            data: Map::new(),
            error_message: None,
        };
        assert_eq!(result.into_payload(), json!({"error": UNKNOWN_ERROR}));
    }

    #[test]
    fn error_truthiness() {
        assert!(!payload_is_error(&json!({"ok": true})));
        assert!(!payload_is_error(&json!({"error": null})));
        assert!(!payload_is_error(&json!({"error": ""})));
        assert!(!payload_is_error(&json!({"error": false})));
        assert!(payload_is_error(&json!({"error": "x"})));
        assert!(payload_is_error(&json!({"error": 1})));
    }

    #[test]
    fn tool_result_from_payload() {
        let ok = ToolResult::from_payload("c1", "echo", json!({"echo": "hi"}));
        assert!(!ok.is_error);
        assert_eq!(ok.content(), r#"{"echo":"hi"}"#);

        let bad = ToolResult::error("c2", "echo", "Invalid JSON in tool arguments");
        assert!(bad.is_error);
        assert_eq!(bad.result["error"], "Invalid JSON in tool arguments");
    }
}
