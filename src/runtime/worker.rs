//! Chat turn processing
//!
//! One queued message becomes: typing indicator, completion, persist, render.

use super::traits::{Transport, TurnHandler};
use crate::llm::Completer;
use crate::render::Renderer;
use crate::state::{ConversationId, StateCache};
use async_trait::async_trait;
use std::sync::Arc;

/// Sent instead of an empty or whitespace-only reply
pub const NO_RESPONSE: &str = "No response received.";

pub struct ChatTurnHandler {
    cache: Arc<StateCache>,
    completer: Completer,
    renderer: Renderer,
    transport: Arc<dyn Transport>,
}

impl ChatTurnHandler {
    pub fn new(
        cache: Arc<StateCache>,
        completer: Completer,
        renderer: Renderer,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            cache,
            completer,
            renderer,
            transport,
        }
    }
}

#[async_trait]
impl TurnHandler for ChatTurnHandler {
    async fn handle_turn(&self, id: ConversationId, text: String) {
        if let Err(e) = self.transport.send_typing(id).await {
            tracing::debug!(conv_id = %id, error = %e, "Typing indicator failed");
        }

        let state = self.cache.get(id).await;
        match self.completer.complete(&state, &text).await {
            Ok(reply) => {
                {
                    let guard = state.lock().await;
                    self.cache.persist(id, &guard).await;
                }

                let reply = if reply.trim().is_empty() {
                    NO_RESPONSE
                } else {
                    reply.as_str()
                };
                match self.renderer.deliver(self.transport.as_ref(), id, reply).await {
                    Ok(rendering) => {
                        tracing::debug!(conv_id = %id, ?rendering, "Reply delivered");
                    }
                    Err(e) => {
                        tracing::warn!(conv_id = %id, error = %e, "Failed to deliver reply");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    conv_id = %id,
                    error = %e,
                    retryable = e.kind.is_retryable(),
                    "Completion failed"
                );
                let notice = e.user_message();
                if let Err(de) = self.renderer.deliver(self.transport.as_ref(), id, &notice).await {
                    tracing::warn!(conv_id = %id, error = %de, "Failed to deliver error notice");
                }
            }
        }
    }
}
