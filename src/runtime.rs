//! Relay runtime
//!
//! Entry points the transport calls: chat text is queued per conversation,
//! commands are applied directly under the conversation's state lock.

mod dispatch;
mod traits;
mod worker;

#[cfg(test)]
pub mod testing;

pub use dispatch::{Dispatcher, EnqueueError, DEFAULT_QUEUE_CAPACITY};
pub use traits::{DeliveryError, Transport, TurnHandler};
pub use worker::ChatTurnHandler;

use crate::commands::{self, Command, Outcome};
use crate::llm::{CompletionApi, Completer};
use crate::render::{Renderer, Rendering};
use crate::state::{ConversationId, StateCache, StateDefaults};
use std::sync::Arc;

/// Tunables for a relay instance
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub defaults: StateDefaults,
    pub max_tokens: u32,
    pub queue_capacity: usize,
    pub renderer: Renderer,
}

/// What became of a plain-text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    /// Answered a pending prompt; reply right away
    Reply(String),
    /// Queued for completion; the reply arrives through the transport
    Queued,
    /// Queue full; tell the user to wait
    Saturated,
}

pub struct Relay {
    cache: Arc<StateCache>,
    dispatcher: Dispatcher,
    api: Arc<dyn CompletionApi>,
    transport: Arc<dyn Transport>,
    renderer: Renderer,
    defaults: StateDefaults,
}

impl Relay {
    pub fn new(
        cache: Arc<StateCache>,
        api: Arc<dyn CompletionApi>,
        transport: Arc<dyn Transport>,
        settings: RelaySettings,
    ) -> Self {
        let handler = ChatTurnHandler::new(
            Arc::clone(&cache),
            Completer::new(Arc::clone(&api), settings.max_tokens),
            settings.renderer,
            Arc::clone(&transport),
        );
        Self {
            cache,
            dispatcher: Dispatcher::new(Arc::new(handler), settings.queue_capacity),
            api,
            transport,
            renderer: settings.renderer,
            defaults: settings.defaults,
        }
    }

    /// Queue a chat turn without waiting for it
    pub fn enqueue_message(&self, id: ConversationId, text: String) -> Result<(), EnqueueError> {
        let result = self.dispatcher.enqueue(id, text);
        if result.is_err() {
            tracing::info!(conv_id = %id, pending = self.dispatcher.pending(id), "Queue saturated");
        }
        result
    }

    /// Apply a configuration command and return the reply text
    pub async fn apply_command(&self, id: ConversationId, command: &Command) -> String {
        let outcome = {
            let state = self.cache.get(id).await;
            let mut guard = state.lock().await;
            let outcome = commands::execute(&mut guard, command, &self.defaults);
            if let Outcome::Reply { changed: true, .. } = outcome {
                self.cache.persist(id, &guard).await;
            }
            outcome
        };
        tracing::debug!(conv_id = %id, ?command, "Applied command");

        match outcome {
            Outcome::Reply { text, .. } => text,
            Outcome::ListModels => self.list_models().await,
        }
    }

    /// Route plain text: answer a pending prompt, or queue it as a chat turn
    pub async fn handle_text(&self, id: ConversationId, text: &str) -> TextOutcome {
        {
            let state = self.cache.get(id).await;
            let mut guard = state.lock().await;
            if let Some(reply) = commands::consume_pending(&mut guard, text) {
                self.cache.persist(id, &guard).await;
                return TextOutcome::Reply(reply);
            }
        }

        match self.enqueue_message(id, text.to_string()) {
            Ok(()) => TextOutcome::Queued,
            Err(EnqueueError::Saturated) => TextOutcome::Saturated,
        }
    }

    /// Send an immediate reply (command output, notices) through the renderer
    pub async fn send_reply(
        &self,
        id: ConversationId,
        text: &str,
    ) -> Result<Rendering, DeliveryError> {
        self.renderer.deliver(self.transport.as_ref(), id, text).await
    }

    async fn list_models(&self) -> String {
        match self.api.list_models().await {
            Ok(models) => commands::format_model_list(&models),
            Err(e) => format!("Failed to fetch models: {e}"),
        }
    }
}
