//! LLM client capability.
//!
//! - `openai`: OpenAI-compatible chat completions over HTTP
//! - `mock`: scripted client for tests and offline runs

pub mod mock;
pub mod openai;

use crate::error::ChatResult;
use crate::models::Message;
use crate::tools::ToolDefinition;
use async_trait::async_trait;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;

/// One round-trip to a model: history and tool catalog in, assistant message out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Non-success responses surface as `ChatError::LlmTransport`.
    async fn chat(&self, history: &[Message], tools: &[ToolDefinition]) -> ChatResult<Message>;

    fn model(&self) -> &str;
}
