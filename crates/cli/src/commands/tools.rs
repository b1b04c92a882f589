//! `sandclaw tools`: List the tools the model can call.

use anyhow::Context;
use sandclaw_config::AppConfig;
use sandclaw_core::provider::ToolDefinition;

pub async fn run(no_extensions: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let session = sandclaw_tools::new_session(&config.tools);
    let mut registry = sandclaw_tools::default_registry(session, &config.tools)
        .context("Failed to build the tool registry")?;

    let extensions = if no_extensions {
        None
    } else {
        Some(super::connect_extensions(&config, &mut registry, None).await?)
    };

    print!("{}", render_definitions(&registry.definitions()));

    if let Some(mut manager) = extensions {
        manager.disconnect_all().await;
    }
    Ok(())
}

/// One line per tool: name, then the first line of its description.
pub fn render_definitions(definitions: &[ToolDefinition]) -> String {
    let width = definitions.iter().map(|d| d.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for def in definitions {
        let summary = def.description.lines().next().unwrap_or_default();
        out.push_str(&format!("  {:<width$}  {summary}\n", def.name));
    }
    out.push_str(&format!("\n  {} tools\n", definitions.len()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters: json!({ "type": "object" }),
        }
    }

    #[test]
    fn aligns_names_and_counts() {
        let out = render_definitions(&[def("set_plan", "Record the plan"), def("mcp_post", "Post\nmore")]);
        assert_eq!(out, "  set_plan  Record the plan\n  mcp_post  Post\n\n  2 tools\n");
    }

    #[test]
    fn empty_list() {
        assert_eq!(render_definitions(&[]), "\n  0 tools\n");
    }
}
