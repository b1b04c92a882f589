//! End-to-end tests for the sandclaw binary and the pieces it wires together.
//!
//! The binary tests run with a scratch `HOME` and a cleared environment, so
//! they never read the developer's config or credentials.

use std::path::Path;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};

use sandclaw_agent::{AgentLoop, LoopState};
use sandclaw_config::{AppConfig, ExtensionConfig};
use sandclaw_core::error::ProviderError;
use sandclaw_core::event::EventBus;
use sandclaw_core::message::{Message, Role, ToolCallRequest};
use sandclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use sandclaw_extensions::ExtensionManager;
use sandclaw_telemetry::TelemetryRecorder;
use serde_json::json;

// ── Binary helpers ──────────────────────────────────────────────────────

fn sandclaw(home: &Path, args: &[&str], extra_env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sandclaw"));
    cmd.args(args).env_clear().env("HOME", home);
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    for (key, value) in extra_env {
        cmd.env(key, value);
    }
    cmd.output().expect("failed to launch sandclaw")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Minimal stdio extension server with a single `ping` tool.
#[cfg(unix)]
const PING_SERVER: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      echo '{"jsonrpc":"2.0","id":'"$id"',"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"ping","version":"0.1.0"}}}'
      ;;
    *'"method":"tools/list"'*)
      echo '{"jsonrpc":"2.0","id":'"$id"',"result":{"tools":[{"name":"ping","description":"Answer pong","inputSchema":{"type":"object"}}]}}'
      ;;
    *'"method":"tools/call"'*)
      echo '{"jsonrpc":"2.0","id":'"$id"',"result":{"content":[{"type":"text","text":"pong"}],"isError":false}}'
      ;;
  esac
done
"#;

#[cfg(unix)]
fn write_ping_server(dir: &Path) -> std::path::PathBuf {
    let script = dir.join("ping_server.sh");
    std::fs::write(&script, PING_SERVER).unwrap();
    script
}

// ── Binary tests ────────────────────────────────────────────────────────

#[test]
fn config_path_lives_under_home() {
    let home = tempfile::tempdir().unwrap();
    let output = sandclaw(home.path(), &["config", "path"], &[]);

    assert!(output.status.success(), "{}", stderr(&output));
    let expected = home.path().join(".sandclaw").join("config.toml");
    assert_eq!(stdout(&output).trim(), expected.display().to_string());
}

#[test]
fn onboard_writes_config_once() {
    let home = tempfile::tempdir().unwrap();
    let config_path = home.path().join(".sandclaw").join("config.toml");

    let first = sandclaw(home.path(), &["onboard"], &[]);
    assert!(first.status.success(), "{}", stderr(&first));
    assert!(config_path.exists());
    assert!(home.path().join(".sandclaw").join("playbooks").is_dir());
    AppConfig::load_from(&config_path).unwrap();

    let second = sandclaw(home.path(), &["onboard"], &[]);
    assert!(second.status.success());
    assert!(stdout(&second).contains("already exists"));
}

#[test]
fn tools_lists_builtins_without_credentials() {
    let home = tempfile::tempdir().unwrap();
    let output = sandclaw(home.path(), &["tools", "--no-extensions"], &[]);

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    for name in ["run_command", "file_read", "init_playbook", "request_review", "task_complete"] {
        assert!(out.contains(name), "missing {name} in:\n{out}");
    }
    assert!(out.contains("13 tools"));
}

#[test]
fn agent_without_key_fails_cleanly() {
    let home = tempfile::tempdir().unwrap();
    let output = sandclaw(home.path(), &["agent", "-m", "hello"], &[]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("no API key"), "{}", stderr(&output));
}

#[test]
fn config_show_redacts_api_key() {
    let home = tempfile::tempdir().unwrap();
    let output = sandclaw(home.path(), &["config", "show"], &[("LLM_API_KEY", "sk-very-secret")]);

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(!out.contains("sk-very-secret"));
    assert!(out.contains("***"));
}

#[test]
fn config_validate_rejects_bad_temperature() {
    let home = tempfile::tempdir().unwrap();
    let dir = home.path().join(".sandclaw");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[provider]\ntemperature = 5.0\n").unwrap();

    let output = sandclaw(home.path(), &["config", "validate"], &[]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("temperature"));
}

#[cfg(unix)]
#[test]
fn tools_includes_extension_proxies() {
    let home = tempfile::tempdir().unwrap();
    let script = write_ping_server(home.path());
    let dir = home.path().join(".sandclaw");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("config.toml"),
        format!("[extensions.ping]\ncommand = \"sh\"\nargs = [\"{}\"]\n", script.display()),
    )
    .unwrap();

    let output = sandclaw(home.path(), &["tools"], &[]);
    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("mcp_ping"), "{out}");
    assert!(out.contains("14 tools"));
}

// ── Library wiring ──────────────────────────────────────────────────────

/// Replays scripted responses and keeps every request it saw.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(mut responses: Vec<ProviderResponse>) -> Self {
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }
}

fn tool_turn(name: &str, args: serde_json::Value) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls(
            None,
            vec![ToolCallRequest::new(format!("call_{name}"), name, args.to_string())],
        ),
        usage: None,
        model: "scripted".into(),
    }
}

fn scratch_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.tools.playbook_dir = Some(dir.join("playbooks"));
    config
}

#[tokio::test]
async fn plan_playbook_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let config = scratch_config(dir.path());
    let session = sandclaw_tools::new_session(&config.tools);
    let registry = sandclaw_tools::default_registry(session.clone(), &config.tools).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn("set_plan", json!({ "steps": ["install nginx", "write playbook"] })),
        tool_turn("init_playbook", json!({ "name": "web" })),
        tool_turn(
            "add_task",
            json!({ "name": "Install nginx", "module": "apt", "args": { "name": "nginx" } }),
        ),
        tool_turn("task_complete", json!({ "summary": "nginx playbook ready" })),
    ]));

    let events = Arc::new(EventBus::default());
    let telemetry = Arc::new(TelemetryRecorder::new(true));
    let task = telemetry.attach(&events).unwrap();

    let mut agent = AgentLoop::new(provider.clone(), "scripted", Arc::new(registry), "system")
        .with_event_bus(events.clone());
    let responses = agent.run("set up nginx", 10).await.unwrap();

    assert_eq!(responses.len(), 4);
    assert!(responses.iter().all(|r| r.tool_results.iter().all(|t| !t.is_error)));
    assert!(responses[3].done);
    assert_eq!(agent.state(), LoopState::Idle);

    let summary = session.summary().await;
    assert_eq!(summary.plan_steps, 2);
    assert_eq!(summary.playbook_name.as_deref(), Some("web"));
    assert_eq!(summary.playbook_tasks, 1);

    // every request after the first carries the previous tool result
    let requests = provider.requests.lock().unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.messages.last().unwrap().role, Role::Tool);
    assert_eq!(last.tools.len(), 13);
    drop(requests);

    drop(agent);
    drop(events);
    task.await.unwrap();
    let counts = telemetry.summary();
    assert_eq!(counts["tool_call"], 4);
    assert_eq!(counts["task_completed"], 1);
}

#[tokio::test]
async fn review_pauses_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = scratch_config(dir.path());
    let session = sandclaw_tools::new_session(&config.tools);
    let registry = sandclaw_tools::default_registry(session, &config.tools).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn("request_review", json!({ "reason": "about to restart sshd" })),
        tool_turn("task_complete", json!({ "summary": "never reached" })),
    ]));
    let mut agent = AgentLoop::new(provider.clone(), "scripted", Arc::new(registry), "system");

    let responses = agent.run("harden ssh", 10).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].awaiting_input);
    assert!(!responses[0].done);
    assert_eq!(provider.requests.lock().unwrap().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn extension_tools_join_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_ping_server(dir.path());
    let config = scratch_config(dir.path());
    let session = sandclaw_tools::new_session(&config.tools);
    let mut registry = sandclaw_tools::default_registry(session, &config.tools).unwrap();

    let mut extensions = ExtensionManager::new();
    let server = ExtensionConfig::new("sh", vec![script.display().to_string()]);
    assert_eq!(extensions.add_server("ping", &server).await.len(), 1);
    extensions.register_tools(&mut registry).unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_turn("mcp_ping", json!({})),
        ProviderResponse {
            message: Message::assistant("pong received, all done"),
            usage: None,
            model: "scripted".into(),
        },
    ]));
    let mut agent = AgentLoop::new(provider, "scripted", Arc::new(registry), "system");

    let responses = agent.run("ping the server", 5).await.unwrap();
    assert_eq!(responses.len(), 2);
    let ping = &responses[0].tool_results[0];
    assert!(!ping.is_error, "{}", ping.content());
    assert_eq!(ping.result["content"][0]["text"], "pong");
    assert!(responses[1].done);

    extensions.disconnect_all().await;
    assert!(extensions.is_empty());
}
