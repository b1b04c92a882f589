//! File read tool: read file contents with path validation.

use async_trait::async_trait;
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult, parse_arguments};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::policy::PathPolicy;

/// Files larger than this are refused rather than dumped into the context.
const MAX_READ_BYTES: u64 = 256 * 1024;

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

pub struct FileReadTool {
    policy: PathPolicy,
}

impl FileReadTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file at the given path."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: ReadArgs = parse_arguments(arguments)?;
        let path = self.policy.check(&args.path).map_err(|e| ToolError::PermissionDenied {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > MAX_READ_BYTES => {
                return Ok(ToolExecutionResult::failure(format!(
                    "File is too large to read ({} bytes, limit {MAX_READ_BYTES})",
                    meta.len()
                )));
            }
            Ok(_) => {}
            Err(e) => return Ok(ToolExecutionResult::failure(format!("Failed to read file: {e}"))),
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolExecutionResult::ok_value(json!({
                "path": path.display().to_string(),
                "content": content,
            }))),
            Err(e) => Ok(ToolExecutionResult::failure(format!("Failed to read file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn tool_definition() {
        let tool = FileReadTool::new(PathPolicy::default());
        assert_eq!(tool.name(), "file_read");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], json!(["path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("hosts.ini");
        std::fs::write(&file_path, "[web]\n10.0.0.5\n").unwrap();

        let tool = FileReadTool::new(PathPolicy::default());
        let result = tool
            .execute(args(json!({"path": file_path.to_str().unwrap()})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data["content"], "[web]\n10.0.0.5\n");
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileReadTool::new(PathPolicy::default());
        let result = tool
            .execute(args(json!({"path": dir.path().join("missing.txt").to_str().unwrap()})))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("Failed to read file"));
    }

    #[tokio::test]
    async fn forbidden_path_blocked() {
        let tool = FileReadTool::new(PathPolicy::new(vec![], vec!["/etc".into()]));
        let err = tool.execute(args(json!({"path": "/etc/shadow"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let tool = FileReadTool::new(PathPolicy::default());
        let err = tool.execute(ToolArguments::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
