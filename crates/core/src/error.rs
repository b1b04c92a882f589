//! Error types for the sandclaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for sandclaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Registry management errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures at the model-backend boundary. These are never recovered by the
/// agent loop; they propagate to whoever called `step()`.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised from inside a tool's `execute`.
///
/// `InvalidArguments` is the argument-shape class; the registry reports it
/// differently from every other variant.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("permission denied: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Shorthand for an `ExecutionFailed` error.
    pub fn failed(tool_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors from managing the registry itself (configuration time).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Tool '{0}' already registered")]
    DuplicateTool(String),

    #[error("Tool '{0}' not found")]
    NotFound(String),
}
