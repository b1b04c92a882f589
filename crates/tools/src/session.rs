//! Session bookkeeping and the conversation-control tools.
//!
//! `request_review` and `task_complete` do no real work; the agent loop
//! watches for their names to pause for a human or to finish.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult, parse_arguments};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::playbook::PlaybookManager;

/// How many recent commands `view_session` shows.
const RECENT_COMMANDS: usize = 10;

/// One `run_command` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters reported by the session tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_duration_seconds: u64,
    pub commands_executed: usize,
    pub commands_failed: usize,
    pub plan_steps: usize,
    pub playbook_name: Option<String>,
    pub playbook_tasks: usize,
}

/// State shared by the built-in tools for one agent session.
pub struct Session {
    started: Instant,
    commands: RwLock<Vec<CommandRecord>>,
    plan: RwLock<Vec<String>>,
    playbook: RwLock<PlaybookManager>,
}

impl Session {
    pub fn new(playbook: PlaybookManager) -> Self {
        Self {
            started: Instant::now(),
            commands: RwLock::new(Vec::new()),
            plan: RwLock::new(Vec::new()),
            playbook: RwLock::new(playbook),
        }
    }

    pub async fn record_command(&self, record: CommandRecord) {
        self.commands.write().await.push(record);
    }

    pub async fn commands(&self) -> Vec<CommandRecord> {
        self.commands.read().await.clone()
    }

    pub async fn set_plan(&self, steps: Vec<String>) {
        *self.plan.write().await = steps;
    }

    pub async fn plan(&self) -> Vec<String> {
        self.plan.read().await.clone()
    }

    /// The in-progress playbook.
    pub fn playbook(&self) -> &RwLock<PlaybookManager> {
        &self.playbook
    }

    pub async fn summary(&self) -> SessionSummary {
        let commands = self.commands.read().await;
        let playbook = self.playbook.read().await;
        SessionSummary {
            session_duration_seconds: self.started.elapsed().as_secs(),
            commands_executed: commands.len(),
            commands_failed: commands.iter().filter(|c| !c.success).count(),
            plan_steps: self.plan.read().await.len(),
            playbook_name: playbook.current().map(|p| p.name.clone()),
            playbook_tasks: playbook.current().map_or(0, |p| p.tasks.len()),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::failed("session", e))
}

/// Shows what has happened so far in the session.
pub struct ViewSessionTool {
    session: Arc<Session>,
}

impl ViewSessionTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ViewSessionTool {
    fn name(&self) -> &str {
        "view_session"
    }

    fn description(&self) -> &str {
        "Show the current session: duration, commands run so far, the plan, and playbook progress."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let summary = self.session.summary().await;
        let commands = self.session.commands().await;
        let recent: Vec<&CommandRecord> = commands.iter().rev().take(RECENT_COMMANDS).rev().collect();

        Ok(ToolExecutionResult::ok_value(json!({
            "summary": to_value(&summary)?,
            "recent_commands": to_value(&recent)?,
            "plan": self.session.plan().await,
        })))
    }
}

#[derive(Deserialize)]
struct ReviewArgs {
    reason: String,
}

/// Pauses the agent until a human has looked at the work.
pub struct RequestReviewTool {
    session: Arc<Session>,
}

impl RequestReviewTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for RequestReviewTool {
    fn name(&self) -> &str {
        "request_review"
    }

    fn description(&self) -> &str {
        "Ask the human operator to review progress before continuing. Use this before running a playbook against real hosts or whenever a decision needs approval."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "What the human should review and why"
                }
            },
            "required": ["reason"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: ReviewArgs = parse_arguments(arguments)?;
        let summary = self.session.summary().await;
        Ok(ToolExecutionResult::ok_value(json!({
            "status": "awaiting_review",
            "reason": args.reason,
            "summary": to_value(&summary)?,
        })))
    }
}

#[derive(Deserialize)]
struct CompleteArgs {
    summary: String,
}

/// Declares the task finished.
pub struct TaskCompleteTool {
    session: Arc<Session>,
}

impl TaskCompleteTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for TaskCompleteTool {
    fn name(&self) -> &str {
        "task_complete"
    }

    fn description(&self) -> &str {
        "Mark the task as complete once the work is done and the playbook is validated."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "A short summary of what was accomplished"
                }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: CompleteArgs = parse_arguments(arguments)?;
        let stats = self.session.summary().await;
        tracing::info!(commands = stats.commands_executed, "Task marked complete");
        Ok(ToolExecutionResult::ok_value(json!({
            "status": "task_complete",
            "summary": args.summary,
            "session_stats": to_value(&stats)?,
        })))
    }
}
