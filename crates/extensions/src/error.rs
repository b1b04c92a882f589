//! Extension error types.

use thiserror::Error;

/// Errors that can occur while talking to an extension server.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The server process could not be started.
    #[error("failed to spawn server '{server}': {reason}")]
    Spawn { server: String, reason: String },

    /// The initialize handshake or catalog step failed.
    #[error("server '{server}' handshake failed: {reason}")]
    Handshake { server: String, reason: String },

    /// Reading or writing the stdio pipes failed.
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// The server answered with a JSON-RPC error object.
    #[error("server error [{code}]: {message}")]
    Rpc { code: i64, message: String },

    #[error("server '{server}' did not answer '{method}' within {timeout_secs}s")]
    Timeout {
        server: String,
        method: String,
        timeout_secs: u64,
    },

    /// A response arrived but did not have the expected shape.
    #[error("protocol error from server '{server}': {reason}")]
    Protocol { server: String, reason: String },
}
