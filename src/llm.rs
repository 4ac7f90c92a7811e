//! Completion endpoint client
//!
//! A thin interface over an `OpenAI`-compatible chat completion API, plus the
//! conversation-aware wrapper that records successful exchanges.

mod completion;
mod error;
mod openai;
mod types;

pub use completion::{build_request, Completer};
pub use error::{UpstreamError, UpstreamErrorKind};
pub use openai::OpenAICompatClient;
pub use types::CompletionRequest;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for completion providers
#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Run one completion and return the assistant text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError>;

    /// List model identifiers offered by the endpoint
    async fn list_models(&self) -> Result<Vec<String>, UpstreamError>;
}

/// Logging wrapper for completion providers
pub struct LoggingApi {
    inner: Arc<dyn CompletionApi>,
}

impl LoggingApi {
    pub fn new(inner: Arc<dyn CompletionApi>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CompletionApi for LoggingApi {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(reply) => {
                tracing::info!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    turns = request.messages.len(),
                    reply_chars = reply.chars().count(),
                    "Completion finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %request.model,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Completion failed"
                );
            }
        }

        result
    }

    async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        let result = self.inner.list_models().await;
        match &result {
            Ok(models) => tracing::debug!(count = models.len(), "Listed models"),
            Err(e) => tracing::warn!(error = %e.message, "Failed to list models"),
        }
        result
    }
}
