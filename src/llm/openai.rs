//! OpenAI-compatible `/chat/completions` client.
//!
//! Transient failures (network errors, 429, 502, 503, 504) are retried with
//! exponential backoff. Error bodies are reduced to a short readable message:
//! the provider's `{error: {message}}` when present, otherwise the body with
//! any HTML markup stripped.

use crate::config::LlmConfig;
use crate::error::{ChatError, ChatResult};
use crate::llm::LlmClient;
use crate::models::{Message, Role};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Longest error body excerpt kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<[^>]+>")
        .unwrap_or_else(|e| panic!("invalid HTML tag regex: {e}"))
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").unwrap_or_else(|e| panic!("invalid whitespace regex: {e}"))
});

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
    completions_url: String,
    retry_base_delay: Duration,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::internal(format!("Failed to build HTTP client: {}", e)))?;
        let completions_url = format!("{}/chat/completions", config.endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            completions_url,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    /// Delay before the first retry; doubles on each further attempt.
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    fn build_request<'a>(
        &'a self,
        history: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.config.model,
            messages: history,
            tools: tools
                .iter()
                .map(|function| WireTool {
                    kind: "function",
                    function,
                })
                .collect(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// POST once; `Ok(Err(..))` carries a retryable failure.
    async fn send_once(
        &self,
        request: &CompletionRequest<'_>,
    ) -> ChatResult<Result<String, ChatError>> {
        let mut builder = self.client.post(&self.completions_url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Err(ChatError::from(e))),
        };

        let status = response.status();
        let body = response.text().await.map_err(ChatError::from)?;
        if status.is_success() {
            return Ok(Ok(body));
        }

        let error = ChatError::llm_transport(
            error_message(status.as_u16(), &body),
            Some(status.as_u16()),
        );
        if error.is_retryable() {
            Ok(Err(error))
        } else {
            Err(error)
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, history: &[Message], tools: &[ToolDefinition]) -> ChatResult<Message> {
        let request = self.build_request(history, tools);
        debug!(
            model = %self.config.model,
            messages = history.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let mut attempt = 0;
        let body = loop {
            match self.send_once(&request).await? {
                Ok(body) => break body,
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        parse_completion(&body)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

fn parse_completion(body: &str) -> ChatResult<Message> {
    let response: CompletionResponse = serde_json::from_str(body).map_err(|e| {
        ChatError::llm_transport(format!("Failed to parse completion response: {}", e), None)
    })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::llm_transport("Provider returned no choices", None))?;

    info!(
        content_len = choice.message.content.len(),
        tool_calls = choice.message.tool_calls().len(),
        finish_reason = ?choice.finish_reason,
        "Received completion"
    );

    let mut message = choice.message;
    message.role = Role::Assistant;
    Ok(message)
}

/// Short message for a non-success response body.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        return format!("HTTP {}: {}", status, parsed.error.message);
    }

    let text = scrub_html(body);
    if text.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, text)
    }
}

/// Strip markup, collapse whitespace and cap the length.
pub fn scrub_html(body: &str) -> String {
    let without_tags = HTML_TAG.replace_all(body, " ");
    let collapsed = WHITESPACE.replace_all(&without_tags, " ");
    let text = collapsed.trim();

    match text.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
