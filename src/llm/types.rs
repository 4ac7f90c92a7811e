//! Common types for completion requests

use crate::state::Message;

/// One request to the completion endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Text of the final user turn, if any
    #[allow(dead_code)] // Used by the mock API
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::state::Role::User)
            .map(|m| m.content.as_str())
    }
}
