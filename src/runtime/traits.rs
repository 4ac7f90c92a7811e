//! Trait abstractions for runtime I/O
//!
//! These traits let the dispatch and delivery paths run against mock
//! implementations in tests.

use crate::state::ConversationId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure to hand a message to the chat transport
#[derive(Debug, Clone, Error)]
#[error("delivery failed: {message}")]
pub struct DeliveryError {
    pub message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outbound side of the chat transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver text with no markup interpretation
    async fn send_plain(&self, id: ConversationId, text: &str) -> Result<(), DeliveryError>;

    /// Deliver text in the transport's safe markup form
    async fn send_markup(&self, id: ConversationId, markup: &str) -> Result<(), DeliveryError>;

    /// Show a "typing" indicator
    async fn send_typing(&self, id: ConversationId) -> Result<(), DeliveryError>;
}

/// Processes one queued chat turn
#[async_trait]
pub trait TurnHandler: Send + Sync {
    async fn handle_turn(&self, id: ConversationId, text: String);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_plain(&self, id: ConversationId, text: &str) -> Result<(), DeliveryError> {
        (**self).send_plain(id, text).await
    }

    async fn send_markup(&self, id: ConversationId, markup: &str) -> Result<(), DeliveryError> {
        (**self).send_markup(id, markup).await
    }

    async fn send_typing(&self, id: ConversationId) -> Result<(), DeliveryError> {
        (**self).send_typing(id).await
    }
}

#[async_trait]
impl<T: TurnHandler + ?Sized> TurnHandler for Arc<T> {
    async fn handle_turn(&self, id: ConversationId, text: String) {
        (**self).handle_turn(id, text).await;
    }
}
