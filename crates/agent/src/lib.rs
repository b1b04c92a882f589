//! The agent loop: the heart of sandclaw.
//!
//! Each turn follows the same cycle:
//!
//! 1. **Send** the pruned conversation and the tool definitions to the model
//! 2. **If tool calls**: run them one by one through the registry, append
//!    every result, and react to the review, command and completion tools
//! 3. **If text**: append it and check it for a completion phrase
//!
//! [`AgentLoop::run`] repeats turns until the agent finishes, asks for a
//! human review, answers in plain text, or runs out of turns.

pub mod conversation;
pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use conversation::{ConversationState, DEFAULT_MAX_HISTORY};
pub use loop_runner::{AgentLoop, AgentResponse, LoopSignals, LoopState, DONE_PHRASES, is_done};
