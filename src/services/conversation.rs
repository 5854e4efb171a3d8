// src/services/conversation.rs
use crate::message::{Message, Role};

/// Client-side chat history for one session. Append-only; turns are recorded
/// whole (user + assistant) so a failed turn never leaves half a pair behind.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages for the next request: `[system] + history + [user]`.
    pub fn outgoing(&self, system_prompt: &str, prompt: &str) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 2);
        out.push(Message::system(system_prompt));
        out.extend(self.messages.iter().cloned());
        out.push(Message::user(prompt));
        out
    }

    /// Append a completed turn and return the new history length.
    pub fn record_turn(&mut self, prompt: impl Into<String>, reply: impl Into<String>) -> usize {
        self.messages.push(Message::new(Role::User, prompt));
        self.messages.push(Message::new(Role::Assistant, reply));
        self.messages.len()
    }

    /// Drop the whole history at once.
    pub fn reset(&mut self) {
        self.messages = Vec::new();
    }
}
