//! Ansible playbook authoring.
//!
//! The agent builds a single-play playbook task by task while it works on
//! the host, so the change can be replayed elsewhere. The playbook is kept
//! in memory and rendered to YAML on demand; dry runs and real runs write it
//! to the playbook directory and shell out to `ansible-playbook`.

use async_trait::async_trait;
use sandclaw_core::error::ToolError;
use sandclaw_core::tool::{Tool, ToolArguments, ToolExecutionResult, parse_arguments};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::session::Session;

/// `ansible-playbook` can take a while on slow hosts.
const ANSIBLE_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum PlaybookError {
    #[error("No playbook initialized. Call init_playbook first.")]
    NotInitialized,

    #[error("failed to render playbook YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to write playbook: {0}")]
    Io(#[from] std::io::Error),
}

/// One task: a module invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookTask {
    pub name: String,
    pub module: String,
    pub args: Value,
}

impl PlaybookTask {
    /// Ansible's shape: `{name: ..., <module>: <args>}`.
    fn to_yaml(&self) -> Result<serde_yaml::Value, serde_yaml::Error> {
        let mut task = serde_yaml::Mapping::new();
        task.insert("name".into(), self.name.clone().into());
        task.insert(self.module.clone().into(), serde_yaml::to_value(&self.args)?);
        Ok(serde_yaml::Value::Mapping(task))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub hosts: String,
    pub tasks: Vec<PlaybookTask>,
}

impl Playbook {
    pub fn to_yaml(&self) -> Result<String, PlaybookError> {
        let tasks = self
            .tasks
            .iter()
            .map(PlaybookTask::to_yaml)
            .collect::<Result<Vec<_>, _>>()?;

        let mut play = serde_yaml::Mapping::new();
        play.insert("name".into(), self.name.clone().into());
        play.insert("hosts".into(), self.hosts.clone().into());
        play.insert("become".into(), true.into());
        play.insert("tasks".into(), serde_yaml::Value::Sequence(tasks));

        let document = serde_yaml::Value::Sequence(vec![serde_yaml::Value::Mapping(play)]);
        Ok(serde_yaml::to_string(&document)?)
    }

    /// Structural problems that would make `ansible-playbook` reject it.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("Play is missing a name".to_string());
        }
        if self.hosts.trim().is_empty() {
            errors.push("Play is missing hosts".to_string());
        }
        if self.tasks.is_empty() {
            errors.push("Play has no tasks".to_string());
        }
        for (i, task) in self.tasks.iter().enumerate() {
            let n = i + 1;
            if task.name.trim().is_empty() {
                errors.push(format!("Task {n} is missing a name"));
            }
            if task.module.trim().is_empty() || task.module.contains(char::is_whitespace) {
                errors.push(format!("Task {n} has an invalid module name '{}'", task.module));
            }
            if !(task.args.is_object() || task.args.is_string() || task.args.is_null()) {
                errors.push(format!("Task {n} arguments must be a mapping or a string"));
            }
        }
        errors
    }

    fn file_name(&self) -> String {
        let slug: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "playbook.yml".into()
        } else {
            format!("{slug}.yml")
        }
    }
}

/// Holds the playbook being built in this session.
pub struct PlaybookManager {
    dir: PathBuf,
    playbook: Option<Playbook>,
}

impl PlaybookManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            playbook: None,
        }
    }

    /// Start a new playbook, discarding any previous one.
    pub fn init(&mut self, name: impl Into<String>, hosts: impl Into<String>) -> &Playbook {
        self.playbook.insert(Playbook {
            name: name.into(),
            hosts: hosts.into(),
            tasks: Vec::new(),
        })
    }

    pub fn current(&self) -> Option<&Playbook> {
        self.playbook.as_ref()
    }

    fn require(&self) -> Result<&Playbook, PlaybookError> {
        self.playbook.as_ref().ok_or(PlaybookError::NotInitialized)
    }

    /// Append a task, returning the new task count.
    pub fn add_task(&mut self, task: PlaybookTask) -> Result<usize, PlaybookError> {
        let playbook = self.playbook.as_mut().ok_or(PlaybookError::NotInitialized)?;
        playbook.tasks.push(task);
        Ok(playbook.tasks.len())
    }

    pub fn to_yaml(&self) -> Result<String, PlaybookError> {
        self.require()?.to_yaml()
    }

    /// Write the playbook under the playbook directory.
    pub async fn write(&self) -> Result<PathBuf, PlaybookError> {
        let playbook = self.require()?;
        let yaml = playbook.to_yaml()?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(playbook.file_name());
        tokio::fs::write(&path, yaml).await?;
        debug!(path = %path.display(), "Wrote playbook");
        Ok(path)
    }
}

fn failure(err: PlaybookError) -> ToolExecutionResult {
    ToolExecutionResult::failure(err.to_string())
}

// --- Tools ---

#[derive(Deserialize)]
struct InitArgs {
    name: String,
    #[serde(default = "default_hosts")]
    hosts: String,
}

fn default_hosts() -> String {
    "all".into()
}

pub struct InitPlaybookTool {
    session: Arc<Session>,
}

impl InitPlaybookTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for InitPlaybookTool {
    fn name(&self) -> &str {
        "init_playbook"
    }

    fn description(&self) -> &str {
        "Start a new Ansible playbook. Replaces any playbook already in progress."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the play" },
                "hosts": { "type": "string", "description": "Host pattern (default: all)" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: InitArgs = parse_arguments(arguments)?;
        let mut manager = self.session.playbook().write().await;
        let playbook = manager.init(args.name, args.hosts);
        info!(playbook = %playbook.name, "Initialized playbook");
        Ok(ToolExecutionResult::ok_value(json!({
            "name": playbook.name,
            "hosts": playbook.hosts,
            "tasks": 0,
        })))
    }
}

#[derive(Deserialize)]
struct AddTaskArgs {
    name: String,
    module: String,
    #[serde(default)]
    args: Value,
}

pub struct AddTaskTool {
    session: Arc<Session>,
}

impl AddTaskTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "add_task"
    }

    fn description(&self) -> &str {
        "Append a task to the playbook, e.g. module 'ansible.builtin.apt' with args {\"name\": \"nginx\", \"state\": \"present\"}."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Human-readable task name" },
                "module": { "type": "string", "description": "Ansible module, e.g. ansible.builtin.apt" },
                "args": { "type": "object", "description": "Module arguments" }
            },
            "required": ["name", "module"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: AddTaskArgs = parse_arguments(arguments)?;
        let task = PlaybookTask {
            name: args.name,
            module: args.module,
            args: if args.args.is_null() { Value::Object(Map::new()) } else { args.args },
        };
        let module = task.module.clone();

        let mut manager = self.session.playbook().write().await;
        match manager.add_task(task) {
            Ok(count) => Ok(ToolExecutionResult::ok_value(json!({
                "added": module,
                "task_count": count,
            }))),
            Err(e) => Ok(failure(e)),
        }
    }
}

pub struct ViewPlaybookTool {
    session: Arc<Session>,
}

impl ViewPlaybookTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ViewPlaybookTool {
    fn name(&self) -> &str {
        "view_playbook"
    }

    fn description(&self) -> &str {
        "Show the playbook built so far as YAML."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let manager = self.session.playbook().read().await;
        match manager.to_yaml() {
            Ok(yaml) => Ok(ToolExecutionResult::ok_value(json!({ "playbook_yaml": yaml }))),
            Err(e) => Ok(failure(e)),
        }
    }
}

pub struct ValidatePlaybookTool {
    session: Arc<Session>,
}

impl ValidatePlaybookTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for ValidatePlaybookTool {
    fn name(&self) -> &str {
        "validate_playbook"
    }

    fn description(&self) -> &str {
        "Check the playbook for structural problems before running it."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let manager = self.session.playbook().read().await;
        let Some(playbook) = manager.current() else {
            return Ok(failure(PlaybookError::NotInitialized));
        };
        let errors = playbook.validate();
        let yaml = match playbook.to_yaml() {
            Ok(yaml) => yaml,
            Err(e) => return Ok(failure(e)),
        };
        Ok(ToolExecutionResult::ok_value(json!({
            "is_valid": errors.is_empty(),
            "errors": errors,
            "playbook_yaml": yaml,
        })))
    }
}

/// Run `ansible-playbook` against a single host.
async fn run_ansible(
    session: &Session,
    tool_name: &str,
    target_host: &str,
    check_mode: bool,
) -> Result<ToolExecutionResult, ToolError> {
    let host = target_host.trim();
    if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == ',') {
        return Err(ToolError::InvalidArguments(format!("invalid target_host '{target_host}'")));
    }

    let path = {
        let manager = session.playbook().read().await;
        match manager.write().await {
            Ok(path) => path,
            Err(e) => return Ok(failure(e)),
        }
    };

    let mut command = Command::new("ansible-playbook");
    command
        .arg(&path)
        .arg("-i")
        .arg(format!("{host},"))
        .env("ANSIBLE_HOST_KEY_CHECKING", "False")
        .kill_on_drop(true);
    if check_mode {
        command.arg("--check");
    }

    info!(playbook = %path.display(), host, check_mode, "Running ansible-playbook");

    let output = match tokio::time::timeout(Duration::from_secs(ANSIBLE_TIMEOUT_SECS), command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Ok(ToolExecutionResult::failure(format!(
                "failed to launch ansible-playbook: {e}"
            )));
        }
        Err(_) => {
            return Err(ToolError::Timeout {
                tool_name: tool_name.into(),
                timeout_secs: ANSIBLE_TIMEOUT_SECS,
            });
        }
    };

    let mut data = Map::new();
    data.insert("stdout".into(), json!(String::from_utf8_lossy(&output.stdout)));
    data.insert("stderr".into(), json!(String::from_utf8_lossy(&output.stderr)));
    data.insert("exit_code".into(), json!(output.status.code()));
    data.insert("check_mode".into(), json!(check_mode));
    data.insert("playbook_path".into(), json!(path.display().to_string()));

    if output.status.success() {
        Ok(ToolExecutionResult::ok(data))
    } else {
        Ok(ToolExecutionResult::failure_with_data("ansible-playbook reported failures", data))
    }
}

#[derive(Deserialize)]
struct DryRunArgs {
    target_host: String,
}

pub struct DryRunPlaybookTool {
    session: Arc<Session>,
}

impl DryRunPlaybookTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for DryRunPlaybookTool {
    fn name(&self) -> &str {
        "dry_run_playbook"
    }

    fn description(&self) -> &str {
        "Run the playbook in check mode (no changes) against a host to see what would change."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target_host": { "type": "string", "description": "Host or IP to check against" }
            },
            "required": ["target_host"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: DryRunArgs = parse_arguments(arguments)?;
        run_ansible(&self.session, self.name(), &args.target_host, true).await
    }
}

#[derive(Deserialize)]
struct RunArgs {
    target_host: String,
    #[serde(default)]
    confirm: bool,
}

pub struct RunPlaybookTool {
    session: Arc<Session>,
}

impl RunPlaybookTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for RunPlaybookTool {
    fn name(&self) -> &str {
        "run_playbook"
    }

    fn description(&self) -> &str {
        "Apply the playbook to a host. Requires confirm=true; request a review first."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target_host": { "type": "string", "description": "Host or IP to apply to" },
                "confirm": { "type": "boolean", "description": "Must be true to actually run" }
            },
            "required": ["target_host", "confirm"]
        })
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<ToolExecutionResult, ToolError> {
        let args: RunArgs = parse_arguments(arguments)?;
        if !args.confirm {
            return Ok(ToolExecutionResult::failure(
                "Execution not confirmed. Set 'confirm' to true to run the playbook.",
            ));
        }
        run_ansible(&self.session, self.name(), &args.target_host, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_in(dir: &std::path::Path) -> Arc<Session> {
        Arc::new(Session::new(PlaybookManager::new(dir)))
    }

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn renders_ansible_task_shape() {
        let playbook = Playbook {
            name: "Web server".into(),
            hosts: "all".into(),
            tasks: vec![PlaybookTask {
                name: "Install nginx".into(),
                module: "ansible.builtin.apt".into(),
                args: json!({"name": "nginx", "state": "present"}),
            }],
        };
        let yaml = playbook.to_yaml().unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let play = &parsed[0];
        assert_eq!(play["name"].as_str(), Some("Web server"));
        assert_eq!(play["hosts"].as_str(), Some("all"));
        let task = &play["tasks"][0];
        assert_eq!(task["name"].as_str(), Some("Install nginx"));
        assert_eq!(task["ansible.builtin.apt"]["state"].as_str(), Some("present"));
    }

    #[test]
    fn validation_catches_structure() {
        let playbook = Playbook {
            name: "".into(),
            hosts: "all".into(),
            tasks: vec![PlaybookTask {
                name: "x".into(),
                module: "bad module".into(),
                args: json!([1, 2]),
            }],
        };
        let errors = playbook.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn file_name_is_slugged() {
        let playbook = Playbook {
            name: "Web Server: Setup!".into(),
            hosts: "all".into(),
            tasks: vec![],
        };
        assert_eq!(playbook.file_name(), "web-server--setup.yml");
    }

    #[tokio::test]
    async fn add_task_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let tool = AddTaskTool::new(session_in(dir.path()));
        let result = tool
            .execute(args(json!({"name": "x", "module": "ping"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("No playbook initialized. Call init_playbook first.")
        );
    }

    #[tokio::test]
    async fn init_add_view_validate() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path());

        let init = InitPlaybookTool::new(session.clone());
        let result = init.execute(args(json!({"name": "Web"}))).await.unwrap();
        assert_eq!(result.data["hosts"], "all");

        let add = AddTaskTool::new(session.clone());
        let result = add
            .execute(args(json!({
                "name": "Install nginx",
                "module": "ansible.builtin.apt",
                "args": {"name": "nginx"}
            })))
            .await
            .unwrap();
        assert_eq!(result.data["task_count"], 1);

        let view = ViewPlaybookTool::new(session.clone());
        let result = view.execute(ToolArguments::new()).await.unwrap();
        assert!(result.data["playbook_yaml"].as_str().unwrap().contains("ansible.builtin.apt"));

        let validate = ValidatePlaybookTool::new(session.clone());
        let result = validate.execute(ToolArguments::new()).await.unwrap();
        assert_eq!(result.data["is_valid"], true);
        assert_eq!(result.data["errors"], json!([]));

        assert_eq!(session.summary().await.playbook_tasks, 1);
    }

    #[tokio::test]
    async fn run_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let tool = RunPlaybookTool::new(session_in(dir.path()));
        let result = tool
            .execute(args(json!({"target_host": "10.0.0.5", "confirm": false})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("not confirmed"));
    }

    #[tokio::test]
    async fn dry_run_without_playbook_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DryRunPlaybookTool::new(session_in(dir.path()));
        let result = tool
            .execute(args(json!({"target_host": "10.0.0.5"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("init_playbook"));
    }

    #[tokio::test]
    async fn dry_run_rejects_host_lists() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DryRunPlaybookTool::new(session_in(dir.path()));
        let err = tool
            .execute(args(json!({"target_host": "a,b"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = PlaybookManager::new(dir.path().join("nested"));
        manager.init("Web", "all");
        let path = manager.write().await.unwrap();
        assert!(path.ends_with("web.yml"));
        assert!(path.exists());
    }
}
