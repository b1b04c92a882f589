//! `sandclaw agent`: Interactive or single-message mode.

use anyhow::Context;
use chrono::Utc;
use sandclaw_agent::{AgentLoop, AgentResponse};
use sandclaw_config::AppConfig;
use sandclaw_core::event::{DomainEvent, EventBus};
use sandclaw_extensions::ExtensionManager;
use sandclaw_telemetry::TelemetryRecorder;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an infrastructure automation agent running in a terminal.

Your capabilities:
- Execute commands on the host with `run_command`
- Create and manage Ansible playbooks
- Plan and execute infrastructure tasks
- Interact with external services through extension tools (names start with `mcp_`)

Guidelines:
- Be concise in your responses
- Explain what you're doing before executing tools
- Report errors clearly
- After a successful `run_command` that modifies system state (installing packages, creating files, changing configuration), add it to the playbook with `add_task`.
- Call `request_review` before any potentially destructive action, or when a significant part of the task is done and the playbook needs approval.
- Run `dry_run_playbook` before `run_playbook` against real hosts.
- Call `task_complete` when all work for the task is finished.
";

const REVIEW_BANNER: &str = "  Review requested. Reply to approve, change course, or type 'reset'.";

pub async fn run(message: Option<String>, max_turns: Option<usize>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    config.check_credentials().context(format!(
        "Provider is not usable; edit {} or set LLM_API_KEY",
        AppConfig::config_path().display()
    ))?;

    let provider = sandclaw_providers::create_provider(&config.provider)
        .context("Failed to create model provider")?;
    let model = config.provider.model().to_string();

    let events = Arc::new(EventBus::default());
    let telemetry = Arc::new(TelemetryRecorder::new(config.telemetry.enabled));
    let telemetry_task = telemetry.attach(&events);

    let session = sandclaw_tools::new_session(&config.tools);
    let mut registry = sandclaw_tools::default_registry(session.clone(), &config.tools)
        .context("Failed to build the tool registry")?;
    let mut extensions =
        super::connect_extensions(&config, &mut registry, Some(events.clone())).await?;

    let system_prompt = config
        .agent
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let mut agent = AgentLoop::new(provider, &model, Arc::new(registry), system_prompt)
        .with_max_history(config.agent.max_history_messages)
        .with_temperature(config.provider.temperature)
        .with_event_bus(events.clone());
    if let Some(max_tokens) = config.provider.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }

    events.publish(DomainEvent::SessionStarted {
        provider: config.provider.kind.to_string(),
        model: model.clone(),
        timestamp: Utc::now(),
    });
    let started = Instant::now();
    let max_turns = max_turns.unwrap_or(config.agent.max_turns);

    let outcome = match message {
        Some(msg) => single(&mut agent, &msg, max_turns).await,
        None => repl(&mut agent, &config, &extensions, max_turns).await,
    };

    extensions.disconnect_all().await;
    drop(extensions);

    events.publish(DomainEvent::SessionEnded {
        duration_secs: started.elapsed().as_secs(),
        timestamp: Utc::now(),
    });
    drop(agent);
    drop(events);
    if let Some(task) = telemetry_task {
        let _ = task.await;
        print_telemetry(&telemetry);
    }

    let summary = session.summary().await;
    tracing::debug!(
        commands = summary.commands_executed,
        failed = summary.commands_failed,
        playbook_tasks = summary.playbook_tasks,
        "Session finished"
    );

    outcome
}

async fn single(agent: &mut AgentLoop, message: &str, max_turns: usize) -> anyhow::Result<()> {
    eprint!("  Thinking...");
    let result = agent.run(message, max_turns).await;
    eprint!("\r              \r");

    let responses = result.context("Model request failed")?;
    for response in &responses {
        print!("{}", render_response(response));
    }
    if responses.last().is_some_and(|r| r.awaiting_input) {
        println!("{REVIEW_BANNER}");
    }
    Ok(())
}

async fn repl(
    agent: &mut AgentLoop,
    config: &AppConfig,
    extensions: &ExtensionManager,
    max_turns: usize,
) -> anyhow::Result<()> {
    println!();
    println!("  sandclaw ({}: {})", config.provider.kind, config.provider.model());
    println!("  Tools:      {}", agent.tools().len());
    if !extensions.is_empty() {
        println!("  Extensions: {}", extensions.server_names().join(", "));
    }
    println!("  Type 'exit' or 'quit' to leave, 'reset' to clear history.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => break,
            "reset" => {
                agent.reset(None);
                println!("  Conversation reset.");
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let result = agent.run(input, max_turns).await;
        eprint!("\r     \r");

        match result {
            Ok(responses) => {
                for response in &responses {
                    print!("{}", render_response(response));
                }
                if responses.last().is_some_and(|r| r.awaiting_input) {
                    println!("{REVIEW_BANNER}");
                }
            }
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!("  Goodbye!");
    Ok(())
}

/// Text printed for one agent step: the content, then one
/// `[tool] (ok|error)` line per tool result.
pub fn render_response(response: &AgentResponse) -> String {
    let mut out = String::new();
    if let Some(content) = response.content.as_deref().filter(|c| !c.is_empty()) {
        out.push('\n');
        for line in content.lines() {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    for result in &response.tool_results {
        let status = if result.is_error { "error" } else { "ok" };
        out.push_str(&format!("  [{}] ({status})\n", result.tool_name));
    }
    out
}

fn print_telemetry(telemetry: &TelemetryRecorder) {
    let summary = telemetry.summary();
    if summary.is_empty() {
        return;
    }
    eprintln!("  Telemetry (session {}):", telemetry.session_id());
    for (name, count) in summary {
        eprintln!("    {name:<20} {count}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandclaw_core::tool::ToolResult;
    use serde_json::json;

    #[test]
    fn render_marks_tool_status() {
        let response = AgentResponse {
            tool_results: vec![
                ToolResult::from_payload("c1", "run_command", json!({ "exit_code": 0 })),
                ToolResult::error("c2", "file_read", "denied"),
            ],
            ..Default::default()
        };
        assert_eq!(
            render_response(&response),
            "  [run_command] (ok)\n  [file_read] (error)\n"
        );
    }

    #[test]
    fn render_indents_content() {
        let response = AgentResponse {
            content: Some("line one\nline two".into()),
            ..Default::default()
        };
        assert_eq!(render_response(&response), "\n  line one\n  line two\n");
    }

    #[test]
    fn render_skips_empty_content() {
        let response = AgentResponse {
            content: Some(String::new()),
            ..Default::default()
        };
        assert!(render_response(&response).is_empty());
    }

    #[test]
    fn default_prompt_names_control_tools() {
        for tool in ["add_task", "request_review", "task_complete", "dry_run_playbook"] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(tool), "{tool}");
        }
    }
}
