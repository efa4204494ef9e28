//! Scripted [`LlmClient`] for tests and offline runs.
//!
//! Replies are served from a queue; once it is empty the fallback reply (if
//! any) repeats forever. Every call is recorded.

use crate::error::{ChatError, ChatResult};
use crate::llm::LlmClient;
use crate::models::{Message, ToolCall};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What one recorded call looked like.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub history_len: usize,
    pub last_message: Option<Message>,
    pub tool_names: Vec<String>,
}

#[derive(Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<ChatResult<Message>>>,
    fallback: Option<Message>,
    calls: AtomicUsize,
    trace: Mutex<Vec<RecordedCall>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client that always requests the same tool call.
    pub fn always_calling(tool: &str, arguments: &str) -> Self {
        Self {
            fallback: Some(Message::assistant_with_tool_calls(
                "",
                vec![ToolCall::new("call_loop", tool, arguments)],
            )),
            ..Self::default()
        }
    }

    pub fn with_reply(self, reply: Message) -> Self {
        self.push(Ok(reply));
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.with_reply(Message::assistant(text))
    }

    pub fn with_tool_call(self, id: &str, tool: &str, arguments: &str) -> Self {
        self.with_reply(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new(id, tool, arguments)],
        ))
    }

    pub fn with_error(self, error: ChatError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, reply: ChatResult<Message>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn trace(&self) -> Vec<RecordedCall> {
        self.trace.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, history: &[Message], tools: &[ToolDefinition]) -> ChatResult<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut trace) = self.trace.lock() {
            trace.push(RecordedCall {
                history_len: history.len(),
                last_message: history.last().cloned(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| ChatError::internal("mock reply queue poisoned"))?
            .pop_front();

        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| ChatError::llm_transport("mock client has no scripted reply", None)),
        }
    }

    fn model(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_fallback() {
        let client = MockLlmClient::always_calling("list_tables", "{}").with_text("first");

        let first = client.chat(&[], &[]).await.unwrap();
        assert_eq!(first.content, "first");

        for _ in 0..3 {
            let reply = client.chat(&[], &[]).await.unwrap();
            assert_eq!(reply.tool_calls()[0].function.name, "list_tables");
        }
        assert_eq!(client.call_count(), 4);
    }

    #[tokio::test]
    async fn test_exhausted_without_fallback() {
        let client = MockLlmClient::new();
        let err = client.chat(&[Message::user("hi")], &[]).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(client.trace()[0].history_len, 1);
    }
}
