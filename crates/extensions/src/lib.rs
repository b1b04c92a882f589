//! Extension servers for sandclaw.
//!
//! An extension is a separate process speaking MCP (JSON-RPC 2.0, one
//! message per line) over stdin/stdout. The [`ExtensionManager`] spawns each
//! configured server, runs the `initialize` handshake, lists its tools and
//! wraps every one as an [`ExtensionTool`] named `mcp_<remote name>`, which
//! the tool registry dispatches like any local tool.

pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod proxy;
pub mod transport;

pub use client::ExtensionClient;
pub use error::ExtensionError;
pub use manager::ExtensionManager;
pub use proxy::{ExtensionTool, TOOL_PREFIX};
