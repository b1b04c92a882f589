//! File write tool: write or create files with path validation.

use async_trait::async_trait;
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult, parse_arguments};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::policy::PathPolicy;

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

pub struct FileWriteTool {
    policy: PathPolicy,
}

impl FileWriteTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file (and parent directories) if missing, overwrites it otherwise."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: WriteArgs = parse_arguments(arguments)?;
        let path = self.policy.check(&args.path).map_err(|e| ToolError::PermissionDenied {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolExecutionResult::failure(format!("Failed to create directory: {e}")));
        }

        match tokio::fs::write(&path, &args.content).await {
            Ok(()) => Ok(ToolExecutionResult::ok_value(json!({
                "path": path.display().to_string(),
                "bytes_written": args.content.len(),
            }))),
            Err(e) => Ok(ToolExecutionResult::failure(format!("Failed to write file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn write_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("output.txt");

        let tool = FileWriteTool::new(PathPolicy::default());
        let result = tool
            .execute(args(json!({
                "path": file_path.to_str().unwrap(),
                "content": "Hello from test!"
            })))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data["bytes_written"], 16);
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "Hello from test!");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("nested").join("dir").join("file.txt");

        let tool = FileWriteTool::new(PathPolicy::default());
        let result = tool
            .execute(args(json!({
                "path": file_path.to_str().unwrap(),
                "content": "nested content"
            })))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&file_path).unwrap(), "nested content");
    }

    #[tokio::test]
    async fn outside_allowed_roots_denied() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let tool = FileWriteTool::new(PathPolicy::new(vec![root.to_string_lossy().to_string()], vec![]));
        let err = tool
            .execute(args(json!({"path": "/definitely/elsewhere.txt", "content": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let tool = FileWriteTool::new(PathPolicy::default());
        let err = tool.execute(args(json!({"path": "/tmp/x"}))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
