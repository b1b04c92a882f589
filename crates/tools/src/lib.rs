//! Built-in tool implementations for sandclaw.
//!
//! Tools give the agent the ability to work on a host: run commands,
//! read and write files, keep a plan, and author an Ansible playbook that
//! reproduces what it did. `request_review` and `task_complete` are the
//! control tools the agent loop watches for.

pub mod file_read;
pub mod file_write;
pub mod plan;
pub mod playbook;
pub mod policy;
pub mod run_command;
pub mod session;

use std::sync::Arc;
use sandclaw_config::ToolsConfig;
use sandclaw_core::error::RegistryError;
use sandclaw_core::tool::{Tool, ToolRegistry};

pub use playbook::{Playbook, PlaybookManager, PlaybookTask};
pub use policy::{CommandPolicy, PathPolicy, PolicyViolation};
pub use session::{Session, SessionSummary};

/// Create a session whose playbooks land in the configured directory.
pub fn new_session(config: &ToolsConfig) -> Arc<Session> {
    Arc::new(Session::new(PlaybookManager::new(config.playbook_dir())))
}

/// Create a registry with every built-in tool bound to `session`.
///
/// Security defaults come from `config`: the command allowlist and timeout
/// for `run_command`, and the allowed/forbidden paths for the file tools.
pub fn default_registry(session: Arc<Session>, config: &ToolsConfig) -> Result<ToolRegistry, RegistryError> {
    let paths = PathPolicy::new(config.allowed_roots.clone(), config.forbidden_paths.clone());
    let commands = CommandPolicy::new(config.allowed_commands.clone());

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(run_command::RunCommandTool::new(
            session.clone(),
            commands,
            config.command_timeout_secs,
        )),
        Arc::new(file_read::FileReadTool::new(paths.clone())),
        Arc::new(file_write::FileWriteTool::new(paths)),
        Arc::new(plan::SetPlanTool::new(session.clone())),
        Arc::new(session::ViewSessionTool::new(session.clone())),
        Arc::new(playbook::InitPlaybookTool::new(session.clone())),
        Arc::new(playbook::AddTaskTool::new(session.clone())),
        Arc::new(playbook::ViewPlaybookTool::new(session.clone())),
        Arc::new(playbook::ValidatePlaybookTool::new(session.clone())),
        Arc::new(playbook::DryRunPlaybookTool::new(session.clone())),
        Arc::new(playbook::RunPlaybookTool::new(session.clone())),
        Arc::new(session::RequestReviewTool::new(session.clone())),
        Arc::new(session::TaskCompleteTool::new(session)),
    ];

    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool)?;
    }
    Ok(registry)
}
