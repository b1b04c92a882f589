//! Proxy tools that forward calls to an extension server.

use async_trait::async_trait;
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::warn;

use crate::protocol::{CallToolResult, METHOD_TOOLS_CALL, RemoteToolDefinition};
use crate::transport::StdioTransport;

/// Prefix that keeps remote tool names apart from local ones.
pub const TOOL_PREFIX: &str = "mcp_";

/// Error text for a remote result flagged `isError`.
pub const REMOTE_FAILURE: &str = "MCP tool execution failed";

pub struct ExtensionTool {
    name: String,
    remote_name: String,
    description: String,
    schema: Value,
    transport: Arc<StdioTransport>,
}

impl ExtensionTool {
    pub fn new(definition: &RemoteToolDefinition, transport: Arc<StdioTransport>) -> Self {
        Self {
            name: format!("{TOOL_PREFIX}{}", definition.name),
            remote_name: definition.name.clone(),
            description: definition
                .description
                .clone()
                .unwrap_or_else(|| format!("Tool '{}' from extension '{}'", definition.name, transport.server())),
            schema: definition.input_schema.clone(),
            transport,
        }
    }

    /// The name the server knows this tool by.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

/// Map a `tools/call` result onto the local result shape.
fn map_call_result(result: CallToolResult) -> ToolExecutionResult {
    let mut data = Map::new();
    data.insert("content".into(), Value::Array(result.content));
    if result.is_error {
        ToolExecutionResult::failure_with_data(REMOTE_FAILURE, data)
    } else {
        ToolExecutionResult::ok(data)
    }
}

#[async_trait]
impl Tool for ExtensionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let params = json!({
            "name": self.remote_name,
            "arguments": arguments,
        });

        let response = match self.transport.request(METHOD_TOOLS_CALL, Some(params)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(server = %self.transport.server(), tool = %self.remote_name, error = %e, "Extension call failed");
                return Ok(ToolExecutionResult::failure(e.to_string()));
            }
        };

        match serde_json::from_value::<CallToolResult>(response) {
            Ok(result) => Ok(map_call_result(result)),
            Err(e) => Ok(ToolExecutionResult::failure(format!(
                "invalid tools/call result from '{}': {e}",
                self.transport.server()
            ))),
        }
    }
}
