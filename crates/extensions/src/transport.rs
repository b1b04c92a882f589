//! JSON-RPC over a child process's stdio.
//!
//! One JSON object per line in each direction. A request holds the reader
//! for its whole exchange, so concurrent callers are serialized and every
//! response is read by the caller that sent the matching id.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::ExtensionError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub struct StdioTransport {
    server: String,
    /// `None` once closed
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
    next_id: AtomicU64,
}

impl StdioTransport {
    pub fn new(server: impl Into<String>, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server: server.into(),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn transport_error(&self, reason: impl Into<String>) -> ExtensionError {
        ExtensionError::Transport {
            server: self.server.clone(),
            reason: reason.into(),
        }
    }

    async fn write_line<T: Serialize>(&self, message: &T) -> Result<(), ExtensionError> {
        let mut line = serde_json::to_string(message)
            .map_err(|e| self.transport_error(format!("failed to serialize message: {e}")))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let stdin = writer
            .as_mut()
            .ok_or_else(|| self.transport_error("transport is closed"))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Send a request and wait for its response, returning the `result`.
    ///
    /// Lines that are not JSON, and messages for other ids, are skipped.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, ExtensionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut reader = self.reader.lock().await;

        self.write_line(&JsonRpcRequest::new(id, method, params)).await?;
        trace!(server = %self.server, id, method, "Sent request");

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;
            if read == 0 {
                return Err(self.transport_error("server closed stdout"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(response) = serde_json::from_str::<JsonRpcResponse>(trimmed) else {
                trace!(server = %self.server, line = trimmed, "Skipping non-JSON line");
                continue;
            };
            if !response.answers(id) {
                continue;
            }

            if let Some(err) = response.error {
                return Err(ExtensionError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            return response.result.ok_or_else(|| ExtensionError::Protocol {
                server: self.server.clone(),
                reason: format!("response to '{method}' has neither result nor error"),
            });
        }
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ExtensionError> {
        self.write_line(&JsonRpcNotification::new(method, params)).await
    }

    /// Close stdin so the server sees EOF. Idempotent.
    pub async fn close(&self) {
        if let Some(mut stdin) = self.writer.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
    }
}
