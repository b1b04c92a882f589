//! # sandclaw core
//!
//! Domain types, traits, and error definitions for the sandclaw agent.
//! This crate has no framework dependencies; it defines the model every
//! other crate builds against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here: [`Provider`] for the model backend and
//! [`Tool`] for capabilities. Implementations live in their own crates, so:
//! - local tools and extension proxies are dispatched uniformly by name
//! - tests swap in mock providers and tools
//! - all crates depend inward on core

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, RegistryError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolChoice, ToolDefinition, Usage};
pub use tool::{
    Tool, ToolArguments, ToolExecutionResult, ToolRegistry, ToolResult, parse_arguments,
    payload_is_error,
};
