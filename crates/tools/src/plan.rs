//! `set_plan`: lets the model write down its steps before acting.

use async_trait::async_trait;
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::session::Session;

pub struct SetPlanTool {
    session: Arc<Session>,
}

impl SetPlanTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SetPlanTool {
    fn name(&self) -> &str {
        "set_plan"
    }

    fn description(&self) -> &str {
        "Record the ordered list of steps you intend to take. Calling it again replaces the plan."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Ordered plan steps"
                }
            },
            "required": ["steps"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let steps: Option<Vec<String>> = match arguments.get("steps") {
            Some(Value::Array(items)) => items.iter().map(|s| s.as_str().map(String::from)).collect(),
            _ => None,
        };
        let Some(steps) = steps else {
            return Ok(ToolExecutionResult::failure("Steps must be a list of strings"));
        };

        self.session.set_plan(steps.clone()).await;
        Ok(ToolExecutionResult::ok_value(json!({ "plan": steps })))
    }
}
