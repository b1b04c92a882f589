//! Bounded conversation history.

use sandclaw_core::message::Message;

/// Default number of non-system messages kept.
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// The system prompt followed by at most `max_history` other messages.
///
/// Pruning evicts the oldest non-system message one at a time. It does not
/// know about turns, so it can drop an assistant tool-call message while
/// keeping the tool results that answered it.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    max_history: usize,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>, max_history: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_history,
        }
    }

    /// Append without pruning.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Evict from index 1 until at most `max_history + 1` messages remain.
    /// Returns how many were evicted.
    pub fn prune(&mut self) -> usize {
        let limit = self.max_history + 1;
        if self.messages.len() <= limit {
            return 0;
        }
        let excess = self.messages.len() - limit;
        self.messages.drain(1..1 + excess);
        excess
    }

    /// Drop everything but the system message, optionally replacing its text.
    pub fn reset(&mut self, system_prompt: Option<String>) {
        let system = match system_prompt.filter(|p| !p.is_empty()) {
            Some(prompt) => Message::system(prompt),
            None => self.messages.swap_remove(0),
        };
        self.messages.clear();
        self.messages.push(system);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        self.messages[0].text()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false; the system message is never evicted.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn set_max_history(&mut self, max_history: usize) {
        self.max_history = max_history;
        self.prune();
    }

    /// The newest message after the system prompt.
    pub fn last(&self) -> Option<&Message> {
        self.messages.get(1..).and_then(|rest| rest.last())
    }
}
