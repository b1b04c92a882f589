//! `run_command` executes one shell command on the host.
//!
//! Chained commands are refused so every change shows up as its own call
//! (and can be mirrored into the playbook). Output is captured, truncated
//! and returned together with the exit code.

use async_trait::async_trait;
use chrono::Utc;
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult, parse_arguments};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::policy::{CommandPolicy, PolicyViolation};
use crate::session::{CommandRecord, Session};

/// Captured stdout/stderr beyond this many bytes is cut.
const MAX_OUTPUT_BYTES: usize = 16 * 1024;

#[derive(Deserialize)]
struct RunArgs {
    command: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

pub struct RunCommandTool {
    session: Arc<Session>,
    policy: CommandPolicy,
    timeout_secs: u64,
}

impl RunCommandTool {
    pub fn new(session: Arc<Session>, policy: CommandPolicy, timeout_secs: u64) -> Self {
        Self {
            session,
            policy,
            timeout_secs,
        }
    }
}

fn truncate(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_OUTPUT_BYTES {
        return text.into_owned();
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated {} bytes]", &text[..end], text.len() - end)
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a single shell command on the host and return its exit code, stdout and stderr. Chained commands (&&, ||, ;, |) are rejected."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Override the default timeout in seconds"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: RunArgs = parse_arguments(arguments)?;
        let command = args.command.trim();

        match self.policy.check(command) {
            Ok(()) => {}
            Err(PolicyViolation::ChainedCommand) => {
                return Ok(ToolExecutionResult::failure(PolicyViolation::ChainedCommand.to_string()));
            }
            Err(PolicyViolation::EmptyCommand) => {
                return Err(ToolError::InvalidArguments("command is empty".into()));
            }
            Err(violation) => {
                return Err(ToolError::PermissionDenied {
                    tool_name: self.name().into(),
                    reason: violation.to_string(),
                });
            }
        }

        let timeout_secs = args.timeout_secs.filter(|t| *t > 0).unwrap_or(self.timeout_secs);
        debug!(command, timeout_secs, "Executing command");

        let child = Command::new("sh")
            .args(["-c", command])
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ToolError::failed(self.name(), format!("failed to start command: {e}"))),
            Err(_) => {
                warn!(command, timeout_secs, "Command timed out");
                self.session
                    .record_command(CommandRecord {
                        command: command.to_string(),
                        exit_code: None,
                        success: false,
                        timestamp: Utc::now(),
                    })
                    .await;
                return Err(ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs,
                });
            }
        };

        let exit_code = output.status.code();
        let success = output.status.success();
        self.session
            .record_command(CommandRecord {
                command: command.to_string(),
                exit_code,
                success,
                timestamp: Utc::now(),
            })
            .await;

        let mut data = Map::new();
        data.insert("exit_code".into(), json!(exit_code));
        data.insert("stdout".into(), json!(truncate(&output.stdout)));
        data.insert("stderr".into(), json!(truncate(&output.stderr)));

        if success {
            Ok(ToolExecutionResult::ok(data))
        } else {
            let status = exit_code.map_or_else(|| "a signal".to_string(), |c| c.to_string());
            warn!(command, status = %status, "Command failed");
            Ok(ToolExecutionResult::failure_with_data(
                format!("Command exited with status {status}"),
                data,
            ))
        }
    }
}
