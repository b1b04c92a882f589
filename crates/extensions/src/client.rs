//! One connected extension server: child process, transport and catalog.

use sandclaw_config::ExtensionConfig;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::ExtensionError;
use crate::protocol::{
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_LIST, PROTOCOL_VERSION, RemoteToolDefinition,
    ToolsListResult,
};
use crate::transport::StdioTransport;

/// Bound on the handshake and catalog steps. Some servers install their
/// package on first start (`npx -y`), so this is generous.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a server gets to exit after stdin closes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Parent variables a server inherits. Everything else, provider keys
/// included, must be listed in the server's own `env`.
#[cfg(not(windows))]
const INHERITED_ENV: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];

#[cfg(windows)]
const INHERITED_ENV: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

/// The environment a server starts with: the inherited defaults found
/// through `lookup`, overridden by the configured `env`.
pub fn server_env<F>(config: &ExtensionConfig, lookup: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env: BTreeMap<String, String> = INHERITED_ENV
        .iter()
        .filter_map(|key| lookup(key).map(|value| (key.to_string(), value)))
        .collect();
    env.extend(config.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

pub struct ExtensionClient {
    name: String,
    child: Child,
    transport: Arc<StdioTransport>,
    tools: Vec<RemoteToolDefinition>,
}

impl std::fmt::Debug for ExtensionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionClient")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ExtensionClient {
    /// Spawn the server, perform the handshake and fetch its tool catalog.
    ///
    /// On any failure after the spawn the child is killed before returning.
    pub async fn connect(name: &str, config: &ExtensionConfig) -> Result<Self, ExtensionError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .env_clear()
            .envs(server_env(config, |key| std::env::var(key).ok()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| ExtensionError::Spawn {
            server: name.to_string(),
            reason: e.to_string(),
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(ExtensionError::Spawn {
                server: name.to_string(),
                reason: "failed to capture stdio".into(),
            });
        };

        if let Some(stderr) = child.stderr.take() {
            let server = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "{line}");
                }
            });
        }

        let transport = Arc::new(StdioTransport::new(name, stdin, stdout));
        match handshake(name, &transport).await {
            Ok(tools) => {
                info!(server = %name, tools = tools.len(), "Connected extension server");
                Ok(Self {
                    name: name.to_string(),
                    child,
                    transport,
                    tools,
                })
            }
            Err(e) => {
                let _ = child.kill().await;
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The catalog returned by `tools/list`.
    pub fn tools(&self) -> &[RemoteToolDefinition] {
        &self.tools
    }

    pub fn transport(&self) -> Arc<StdioTransport> {
        self.transport.clone()
    }

    /// Close stdin, give the server a moment to exit, then kill it.
    pub async fn disconnect(mut self) -> Result<(), ExtensionError> {
        self.transport.close().await;
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.name, %status, "Extension server exited");
                Ok(())
            }
            Ok(Err(e)) => Err(ExtensionError::Transport {
                server: self.name.clone(),
                reason: format!("failed to wait for exit: {e}"),
            }),
            Err(_) => {
                warn!(server = %self.name, "Extension server did not exit, killing it");
                self.child.kill().await.map_err(|e| ExtensionError::Transport {
                    server: self.name.clone(),
                    reason: format!("failed to kill process: {e}"),
                })
            }
        }
    }
}

async fn with_timeout<T>(
    server: &str,
    method: &str,
    fut: impl Future<Output = Result<T, ExtensionError>>,
) -> Result<T, ExtensionError> {
    tokio::time::timeout(CONNECT_TIMEOUT, fut)
        .await
        .map_err(|_| ExtensionError::Timeout {
            server: server.to_string(),
            method: method.to_string(),
            timeout_secs: CONNECT_TIMEOUT.as_secs(),
        })?
}

async fn handshake(name: &str, transport: &StdioTransport) -> Result<Vec<RemoteToolDefinition>, ExtensionError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "sandclaw",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let init = with_timeout(name, METHOD_INITIALIZE, transport.request(METHOD_INITIALIZE, Some(params)))
        .await
        .map_err(|e| handshake_error(name, e))?;
    debug!(
        server = %name,
        protocol = init.get("protocolVersion").and_then(|v| v.as_str()).unwrap_or("unknown"),
        "Initialized"
    );

    transport.notify(METHOD_INITIALIZED, None).await?;

    let list = with_timeout(name, METHOD_TOOLS_LIST, transport.request(METHOD_TOOLS_LIST, None)).await?;
    let list: ToolsListResult = serde_json::from_value(list).map_err(|e| ExtensionError::Protocol {
        server: name.to_string(),
        reason: format!("invalid tools/list result: {e}"),
    })?;
    Ok(list.tools)
}

/// RPC and protocol failures during `initialize` are reported as a failed
/// handshake; transport and timeout errors keep their own kind.
fn handshake_error(name: &str, err: ExtensionError) -> ExtensionError {
    match err {
        ExtensionError::Rpc { code, message } => ExtensionError::Handshake {
            server: name.to_string(),
            reason: format!("[{code}] {message}"),
        },
        ExtensionError::Protocol { reason, .. } => ExtensionError::Handshake {
            server: name.to_string(),
            reason,
        },
        other => other,
    }
}
