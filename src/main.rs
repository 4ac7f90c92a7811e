//! Chat relay - Telegram front end for an OpenAI-compatible completion API
//!
//! Each chat gets its own model, system prompt, presets and bounded history,
//! persisted as JSON. Messages within a chat are answered strictly in order,
//! one completion at a time; different chats run in parallel.

mod commands;
mod config;
mod llm;
mod render;
mod runtime;
mod state;
mod telegram;

use config::RelayConfig;
use llm::{CompletionApi, LoggingApi, OpenAICompatClient};
use render::Renderer;
use runtime::{Relay, RelaySettings};
use state::{JsonFileStore, StateCache};
use std::sync::Arc;
use teloxide::Bot;
use telegram::TelegramTransport;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = RelayConfig::from_env()?;
    if config.allowed_chats.is_open() {
        tracing::warn!("RELAY_ALLOWED_CHATS is empty; every chat may use the relay");
    }

    // Conversation store and cache
    let store = JsonFileStore::new(&config.data_dir, config.state_defaults());
    store.ensure_dir().await?;
    tracing::info!(path = %store.dir().display(), "Using conversation store");

    let cache = Arc::new(StateCache::new(Arc::new(store)));
    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(config.cache_sweep_interval, shutdown.clone());

    // Completion endpoint
    let client = OpenAICompatClient::new(
        config.api_endpoint.as_str(),
        config.api_key.as_str(),
        config.request_timeout,
    )?;
    let api: Arc<dyn CompletionApi> = Arc::new(LoggingApi::new(Arc::new(client)));

    let renderer = Renderer::default();
    tracing::info!(
        endpoint = %config.api_endpoint,
        default_model = %config.default_model,
        max_tokens = config.max_tokens,
        timeout_secs = config.request_timeout.as_secs(),
        queue_capacity = config.queue_capacity,
        chunk_limit = renderer.limit(),
        "Relay configured"
    );

    let bot = Bot::new(&config.bot_token);
    let relay = Arc::new(Relay::new(
        cache,
        api,
        Arc::new(TelegramTransport::new(bot.clone())),
        RelaySettings {
            defaults: config.state_defaults(),
            max_tokens: config.max_tokens,
            queue_capacity: config.queue_capacity,
            renderer,
        },
    ));

    tracing::info!("Starting Telegram dispatcher");
    telegram::run(bot, relay, config.allowed_chats).await;

    shutdown.cancel();
    sweeper.await?;
    tracing::info!("Relay stopped");
    Ok(())
}
