//! Telegram transport
//!
//! Inbound updates are checked against the allow-list and routed to the
//! relay; outbound replies go through [`TelegramTransport`].

use crate::commands::Command;
use crate::config::AllowList;
use crate::runtime::{DeliveryError, Relay, TextOutcome, Transport};
use crate::state::ConversationId;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Message as TgMessage, ParseMode};

/// Sent when a conversation already has a full queue
pub const SATURATED_REPLY: &str =
    "Still working on your earlier messages. Please wait for a reply before sending more.";

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn chat_id(id: ConversationId) -> ChatId {
    ChatId(id.0)
}

#[allow(clippy::needless_pass_by_value)] // Shape required by map_err
fn delivery_error(e: teloxide::RequestError) -> DeliveryError {
    DeliveryError::new(e.to_string())
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_plain(&self, id: ConversationId, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(chat_id(id), text)
            .await
            .map(|_| ())
            .map_err(delivery_error)
    }

    async fn send_markup(&self, id: ConversationId, markup: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(chat_id(id), markup)
            .parse_mode(ParseMode::Html)
            .await
            .map(|_| ())
            .map_err(delivery_error)
    }

    async fn send_typing(&self, id: ConversationId) -> Result<(), DeliveryError> {
        self.bot
            .send_chat_action(chat_id(id), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(delivery_error)
    }
}

/// Immediate reply for a plain-text message, if any
fn text_reply(outcome: TextOutcome) -> Option<String> {
    match outcome {
        TextOutcome::Reply(reply) => Some(reply),
        TextOutcome::Queued => None,
        TextOutcome::Saturated => Some(SATURATED_REPLY.to_string()),
    }
}

#[allow(clippy::unnecessary_wraps)] // Endpoint signature expected by the dispatcher
async fn handle_message(
    msg: TgMessage,
    relay: Arc<Relay>,
    allow: Arc<AllowList>,
) -> ResponseResult<()> {
    let id = ConversationId(msg.chat.id.0);
    if !allow.permits(id) {
        tracing::info!(conv_id = %id, "Ignoring chat outside the allow-list");
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let reply = match Command::parse(text) {
        Some(command) => Some(relay.apply_command(id, &command).await),
        None => text_reply(relay.handle_text(id, text).await),
    };

    if let Some(reply) = reply {
        if let Err(e) = relay.send_reply(id, &reply).await {
            tracing::warn!(conv_id = %id, error = %e, "Failed to deliver reply");
        }
    }
    Ok(())
}

/// Receive updates until Ctrl-C
pub async fn run(bot: Bot, relay: Arc<Relay>, allow: AllowList) {
    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay, Arc::new(allow)])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
