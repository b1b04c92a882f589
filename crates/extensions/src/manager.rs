//! Owns every connected extension server and the proxies built from them.

use chrono::Utc;
use sandclaw_config::ExtensionConfig;
use sandclaw_core::error::RegistryError;
use sandclaw_core::event::{DomainEvent, EventBus};
use sandclaw_core::tool::{Tool, ToolRegistry};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::client::ExtensionClient;
use crate::proxy::ExtensionTool;

#[derive(Default)]
pub struct ExtensionManager {
    /// Connected servers in connection order
    clients: Vec<ExtensionClient>,
    tools: Vec<Arc<dyn Tool>>,
    events: Option<Arc<EventBus>>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Connect a server and return the proxy tools it contributed.
    ///
    /// Never fails: a server that cannot be spawned or does not complete the
    /// handshake is logged and contributes no tools.
    pub async fn add_server(&mut self, name: &str, config: &ExtensionConfig) -> Vec<Arc<dyn Tool>> {
        if self.clients.iter().any(|c| c.name() == name) {
            warn!(server = %name, "Extension server already connected, ignoring");
            return Vec::new();
        }

        let client = match ExtensionClient::connect(name, config).await {
            Ok(client) => client,
            Err(e) => {
                error!(server = %name, error = %e, "Failed to connect extension server");
                self.publish(DomainEvent::ExtensionFailed {
                    server: name.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Vec::new();
            }
        };

        let transport = client.transport();
        let tools: Vec<Arc<dyn Tool>> = client
            .tools()
            .iter()
            .map(|def| Arc::new(ExtensionTool::new(def, transport.clone())) as Arc<dyn Tool>)
            .collect();

        self.publish(DomainEvent::ExtensionConnected {
            server: name.to_string(),
            tool_count: tools.len(),
            timestamp: Utc::now(),
        });

        self.clients.push(client);
        self.tools.extend(tools.iter().cloned());
        tools
    }

    /// Disconnect every server. Failures are logged and do not stop the
    /// others; the manager is empty afterwards either way.
    pub async fn disconnect_all(&mut self) {
        for client in self.clients.drain(..) {
            let name = client.name().to_string();
            match client.disconnect().await {
                Ok(()) => info!(server = %name, "Disconnected extension server"),
                Err(e) => warn!(server = %name, error = %e, "Failed to disconnect extension server"),
            }
        }
        self.tools.clear();
    }

    /// Register every proxy tool. Stops at the first name collision.
    pub fn register_tools(&self, registry: &mut ToolRegistry) -> Result<(), RegistryError> {
        for tool in &self.tools {
            registry.register(tool.clone())?;
        }
        Ok(())
    }

    /// All proxy tools from all connected servers.
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_command_contributes_nothing() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut manager = ExtensionManager::new().with_event_bus(bus);

        let config = ExtensionConfig::new("sandclaw-definitely-not-a-real-binary", vec![]);
        let tools = manager.add_server("ghost", &config).await;

        assert!(tools.is_empty());
        assert!(manager.tools().is_empty());
        assert!(manager.server_names().is_empty());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "extension_failed");
    }

    #[tokio::test]
    async fn disconnect_all_on_empty_manager() {
        let mut manager = ExtensionManager::new();
        manager.disconnect_all().await;
        assert!(manager.is_empty());

        let mut registry = ToolRegistry::new();
        manager.register_tools(&mut registry).unwrap();
        assert!(registry.is_empty());
    }
}
