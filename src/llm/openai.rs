//! `OpenAI`-compatible provider implementation

use super::types::CompletionRequest;
use super::{CompletionApi, UpstreamError};
use crate::state::Message;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest slice of an error body quoted back in a rejection
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Client for any endpoint speaking the chat completions protocol
pub struct OpenAICompatClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAICompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn read_body(response: reqwest::Response) -> Result<String, UpstreamError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::unavailable(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(UpstreamError::rejected(status.as_u16(), error_detail(&body)));
        }
        Ok(body)
    }
}

fn transport_error(e: &reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::unavailable(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        UpstreamError::unavailable(format!("Connection failed: {e}"))
    } else {
        UpstreamError::unavailable(format!("Request failed: {e}"))
    }
}

/// Pull the provider's error message out of a failure body, or quote the body
fn error_detail(body: &str) -> String {
    if let Ok(error_resp) = serde_json::from_str::<OpenAIErrorResponse>(body) {
        return error_resp.error.message;
    }
    let trimmed = body.trim();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl CompletionApi for OpenAICompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        let payload = ChatRequest {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let body = Self::read_body(response).await?;
        parse_completion_body(&body)
    }

    async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let body = Self::read_body(response).await?;
        parse_model_list(&body)
    }
}

/// Read a completion body in whichever format it actually holds.
///
/// A plain JSON document is tried first. Anything else is read as an event
/// stream, skipping fragments that fail to decode.
pub(crate) fn parse_completion_body(body: &str) -> Result<String, UpstreamError> {
    match serde_json::from_str::<ChatResponse>(body) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| UpstreamError::malformed("No choices in response")),
        Err(json_err) => parse_event_stream(body).ok_or_else(|| {
            tracing::debug!(body = %body, "Unparseable completion body");
            UpstreamError::malformed(format!("Failed to parse response: {json_err}"))
        }),
    }
}

/// Accumulate content from `data:` lines until the `[DONE]` sentinel.
///
/// Returns `None` when not a single fragment decoded.
fn parse_event_stream(body: &str) -> Option<String> {
    let mut content = String::new();
    let mut salvaged = false;

    for line in body.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => {
                salvaged = true;
                if let Some(text) = chunk.choices.into_iter().next().and_then(StreamChoice::text) {
                    content.push_str(&text);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed stream fragment");
            }
        }
    }

    salvaged.then_some(content)
}

/// Model ids from either `{"data":[...]}` or `{"models":[...]}`
pub(crate) fn parse_model_list(body: &str) -> Result<Vec<String>, UpstreamError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| UpstreamError::malformed(format!("Failed to parse model list: {e}")))?;

    let entries = value
        .get("data")
        .and_then(serde_json::Value::as_array)
        .or_else(|| value.get("models").and_then(serde_json::Value::as_array))
        .ok_or_else(|| UpstreamError::malformed("Model list has neither data nor models"))?;

    Ok(entries
        .iter()
        .filter_map(|entry| entry.get("id").and_then(serde_json::Value::as_str))
        .map(str::to_string)
        .collect())
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Default, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

/// Fragments carry text under `message` or, in the usual streaming shape, `delta`
#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    message: Option<ChatContent>,
    #[serde(default)]
    delta: Option<ChatContent>,
}

impl StreamChoice {
    fn text(self) -> Option<String> {
        self.message
            .and_then(|m| m.content)
            .or_else(|| self.delta.and_then(|d| d.content))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::UpstreamErrorKind;
    use crate::state::Message;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::system("Be brief."), Message::user("Hello")],
            max_tokens: 16000,
        }
    }

    fn client(server: &mockito::ServerGuard) -> OpenAICompatClient {
        OpenAICompatClient::new(format!("{}/v1/", server.url()), "test-key", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_parse_plain_json_body() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hi!"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_completion_body(body).unwrap(), "Hi!");
    }

    #[test]
    fn test_parse_null_content_is_empty_success() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(parse_completion_body(body).unwrap(), "");
    }

    #[test]
    fn test_parse_no_choices_is_malformed() {
        let err = parse_completion_body(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::Malformed);
    }

    #[test]
    fn test_parse_event_stream_body() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                    data: {\"choices\":[{\"message\":{\"content\":\"lo\"}}]}\n\n\
                    data: [DONE]\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";
        assert_eq!(parse_completion_body(body).unwrap(), "Hello");
    }

    #[test]
    fn test_parse_event_stream_skips_bad_fragments() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\
                    data: {broken\n\
                    : keep-alive comment\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\
                    data: [DONE]\n";
        assert_eq!(parse_completion_body(body).unwrap(), "ab");
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        for body in ["", "<html>502 Bad Gateway</html>", "data: {nope}\ndata: [DONE]\n"] {
            let err = parse_completion_body(body).unwrap_err();
            assert_eq!(err.kind, UpstreamErrorKind::Malformed, "body: {body:?}");
        }
    }

    #[test]
    fn test_parse_model_list_shapes() {
        let data = r#"{"object":"list","data":[{"id":"gpt-4o"},{"id":"gpt-4o-mini"},{"name":"no-id"}]}"#;
        assert_eq!(parse_model_list(data).unwrap(), vec!["gpt-4o", "gpt-4o-mini"]);

        let models = r#"{"models":[{"id":"llama3"}]}"#;
        assert_eq!(parse_model_list(models).unwrap(), vec!["llama3"]);

        let err = parse_model_list(r#"{"other":[]}"#).unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::Malformed);
    }

    #[test]
    fn test_request_serialization() {
        let req = request();
        let payload = ChatRequest {
            model: &req.model,
            messages: &req.messages,
            stream: false,
            max_tokens: req.max_tokens,
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ],
                "stream": false,
                "max_tokens": 16000
            })
        );
    }

    #[test]
    fn test_error_detail_truncates_long_bodies() {
        let body = "x".repeat(500);
        let detail = error_detail(&body);
        assert_eq!(detail.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert_eq!(
            error_detail(r#"{"error":{"message":"Invalid API key","type":"auth"}}"#),
            "Invalid API key"
        );
    }

    #[tokio::test]
    async fn test_complete_posts_bearer_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "stream": false,
                "max_tokens": 16000
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hello back"}}]}"#)
            .create_async()
            .await;

        let reply = client(&server).complete(&request()).await.unwrap();
        assert_eq!(reply, "Hello back");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_reads_event_stream_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"streamed\"}}]}\n\ndata: [DONE]\n\n")
            .create_async()
            .await;

        let reply = client(&server).complete(&request()).await.unwrap();
        assert_eq!(reply, "streamed");
    }

    #[tokio::test]
    async fn test_complete_maps_status_to_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached"}}"#)
            .create_async()
            .await;

        let err = client(&server).complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::Rejected { status: 429 });
        assert_eq!(err.message, "Rate limit reached");
    }

    #[tokio::test]
    async fn test_complete_unreachable_is_unavailable() {
        let client =
            OpenAICompatClient::new("http://127.0.0.1:1", "k", Duration::from_secs(2)).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/models")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"a"},{"id":"b"}]}"#)
            .create_async()
            .await;

        let models = client(&server).list_models().await.unwrap();
        assert_eq!(models, vec!["a", "b"]);
    }
}
