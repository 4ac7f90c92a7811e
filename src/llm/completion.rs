//! Conversation-aware completion
//!
//! Builds the request from a conversation's state, runs it, and records the
//! exchange only when the endpoint produced a reply. The state lock is held
//! while snapshotting and while recording, never across the network call.

use super::types::CompletionRequest;
use super::{CompletionApi, UpstreamError};
use crate::state::{ConversationState, Message, SharedState};
use std::sync::Arc;

/// Message sequence for one turn: system prompt (if any), history, new text
pub fn build_request(state: &ConversationState, user_text: &str, max_tokens: u32) -> CompletionRequest {
    let mut messages = Vec::with_capacity(state.history.len() + 2);
    if !state.system_prompt.is_empty() {
        messages.push(Message::system(state.system_prompt.as_str()));
    }
    messages.extend(state.history.iter().cloned());
    messages.push(Message::user(user_text));

    CompletionRequest {
        model: state.model.clone(),
        messages,
        max_tokens,
    }
}

/// Runs completions against a conversation's live state
pub struct Completer {
    api: Arc<dyn CompletionApi>,
    max_tokens: u32,
}

impl Completer {
    pub fn new(api: Arc<dyn CompletionApi>, max_tokens: u32) -> Self {
        Self { api, max_tokens }
    }

    /// Complete `user_text` and append the exchange to history on success.
    ///
    /// On error the state is untouched. The caller persists afterwards.
    pub async fn complete(&self, state: &SharedState, user_text: &str) -> Result<String, UpstreamError> {
        let request = {
            let guard = state.lock().await;
            build_request(&guard, user_text, self.max_tokens)
        };

        let reply = self.api.complete(&request).await?;

        state.lock().await.record_exchange(user_text, &reply);
        Ok(reply)
    }
}
