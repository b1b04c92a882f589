pub mod agent;
pub mod config_cmd;
pub mod onboard;
pub mod tools;

use sandclaw_config::AppConfig;
use sandclaw_core::event::EventBus;
use sandclaw_core::tool::ToolRegistry;
use sandclaw_extensions::ExtensionManager;
use std::sync::Arc;

/// Connect every enabled extension server and register its proxy tools.
///
/// A server that fails to start is logged by the manager and skipped.
pub async fn connect_extensions(
    config: &AppConfig,
    registry: &mut ToolRegistry,
    events: Option<Arc<EventBus>>,
) -> anyhow::Result<ExtensionManager> {
    let mut manager = match events {
        Some(bus) => ExtensionManager::new().with_event_bus(bus),
        None => ExtensionManager::new(),
    };

    for (name, server) in config.enabled_extensions() {
        let tools = manager.add_server(name, server).await;
        if !tools.is_empty() {
            eprintln!("  Connected extension '{name}' ({} tools)", tools.len());
        }
    }

    if let Err(e) = manager.register_tools(registry) {
        manager.disconnect_all().await;
        return Err(anyhow::Error::new(e).context("Failed to register extension tools"));
    }

    Ok(manager)
}
