//! Reply rendering and delivery
//!
//! Replies go out as plain text when they fit, as HTML markup when plain text
//! is refused, and as a sequence of plain chunks when neither fits in one
//! message. Sizes are measured in UTF-16 code units, as Telegram counts them.

mod chunk;
mod markup;

pub use chunk::{message_len, split};
pub use markup::to_html;

use crate::runtime::{DeliveryError, Transport};
use crate::state::ConversationId;

/// Hard ceiling the chat transport enforces per message
pub const TRANSPORT_MESSAGE_LIMIT: usize = 4096;

/// Headroom kept below the transport ceiling
pub const SAFETY_MARGIN: usize = 96;

/// How a reply ended up being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendering {
    Plain,
    Markup,
    Chunked(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    limit: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::with_limit(TRANSPORT_MESSAGE_LIMIT - SAFETY_MARGIN)
    }
}

impl Renderer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: limit.clamp(1, TRANSPORT_MESSAGE_LIMIT),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Deliver `text` to a conversation, falling back tier by tier.
    ///
    /// A failure on any chunk stops the remaining chunks and is returned.
    pub async fn deliver(
        &self,
        transport: &dyn Transport,
        id: ConversationId,
        text: &str,
    ) -> Result<Rendering, DeliveryError> {
        if message_len(text) <= self.limit {
            match transport.send_plain(id, text).await {
                Ok(()) => return Ok(Rendering::Plain),
                Err(e) => {
                    tracing::debug!(conv_id = %id, error = %e, "Plain delivery refused, trying markup");
                }
            }
        }

        let html = to_html(text);
        if message_len(&html) <= self.limit {
            match transport.send_markup(id, &html).await {
                Ok(()) => return Ok(Rendering::Markup),
                Err(e) => {
                    tracing::debug!(conv_id = %id, error = %e, "Markup delivery refused, splitting");
                }
            }
        }

        let chunks = split(text, self.limit);
        let total = chunks.len();
        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(e) = transport.send_plain(id, chunk).await {
                tracing::warn!(
                    conv_id = %id,
                    chunk = index + 1,
                    total,
                    error = %e,
                    "Chunk delivery failed, dropping the rest"
                );
                return Err(e);
            }
        }
        Ok(Rendering::Chunked(total))
    }
}
