//! The tool-calling conversation loop.
//!
//! One [`Orchestrator`] owns one conversation. Each `chat` call appends the
//! user's message and then alternates between the model and the tool
//! registry until the model answers without tool calls or the round cap is
//! reached. Tool calls within a reply run one after another, in order.
//!
//! Tool failures never abort a turn: they are written back to the model as
//! `{"error": ...}` tool messages. Only LLM transport failures and the round
//! cap end a `chat` call with an error.

use crate::chat::prompt::build_system_prompt;
use crate::chat::response::parse_response;
use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::db::DatabaseProvider;
use crate::error::{ChatError, ChatResult};
use crate::llm::LlmClient;
use crate::models::{ChatResponse, DatabaseMetadata, Message, ToolCall};
use crate::tools::ToolRegistry;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    schema_metadata: Option<Arc<DatabaseMetadata>>,
    history: Vec<Message>,
    max_iterations: usize,
}

impl Orchestrator {
    /// New conversation in read-only mode, history seeded with the system prompt.
    pub fn new(llm: Arc<dyn LlmClient>, provider: Arc<dyn DatabaseProvider>) -> Self {
        let registry = ToolRegistry::new(provider);
        let system = build_system_prompt(None, registry.get_tools());
        Self {
            llm,
            registry,
            schema_metadata: None,
            history: vec![Message::system(system)],
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Round cap per `chat` call; at least one round always runs.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Install scanned metadata; rebuilds the prompt and resets history.
    pub fn set_schema_metadata(&mut self, metadata: DatabaseMetadata) {
        self.set_shared_schema_metadata(Arc::new(metadata));
    }

    /// Same as [`set_schema_metadata`](Self::set_schema_metadata) for metadata shared between sessions.
    pub fn set_shared_schema_metadata(&mut self, metadata: Arc<DatabaseMetadata>) {
        info!(tables = metadata.tables.len(), "Schema metadata updated");
        self.registry.set_schema_metadata(Some(metadata.clone()));
        self.schema_metadata = Some(metadata);
        self.clear_history();
    }

    pub fn schema_metadata(&self) -> Option<&DatabaseMetadata> {
        self.schema_metadata.as_deref()
    }

    /// Truncate history back to a freshly built system message.
    pub fn clear_history(&mut self) {
        let system = build_system_prompt(self.schema_metadata.as_deref(), self.registry.get_tools());
        self.history = vec![Message::system(system)];
        debug!("Conversation history cleared");
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn set_read_only_mode(&mut self, read_only: bool) {
        info!(read_only, "Read-only mode changed");
        self.registry.set_read_only_mode(read_only);
    }

    pub fn read_only_mode(&self) -> bool {
        self.registry.read_only_mode()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run one user turn to a final answer.
    pub async fn chat(&mut self, user_message: &str) -> ChatResult<ChatResponse> {
        self.history.push(Message::user(user_message));

        for round in 1..=self.max_iterations {
            debug!(round, history = self.history.len(), "Calling model");
            let reply = self
                .llm
                .chat(&self.history, self.registry.get_tools())
                .await?;
            self.history.push(reply.clone());

            if !reply.has_tool_calls() {
                info!(round, "Model produced final answer");
                return Ok(parse_response(&reply.content));
            }

            for call in reply.tool_calls() {
                let content = self.dispatch(call).await;
                self.history.push(Message::tool(
                    call.id.clone(),
                    call.function.name.clone(),
                    content,
                ));
            }
        }

        warn!(max_iterations = self.max_iterations, "Tool-calling round cap reached");
        Err(ChatError::max_iterations_exceeded(self.max_iterations))
    }

    /// Like [`chat`](Self::chat), but a failed turn becomes an `Error: ...` text response.
    pub async fn chat_or_error(&mut self, user_message: &str) -> ChatResponse {
        match self.chat(user_message).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Chat turn failed");
                ChatResponse::error(e)
            }
        }
    }

    /// Execute one tool call and serialize its outcome for the tool message.
    async fn dispatch(&self, call: &ToolCall) -> String {
        let name = call.function.name.as_str();
        let outcome = match decode_arguments(&call.function.arguments) {
            Ok(params) => self.registry.execute_tool(name, params).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                debug!(tool = %name, call_id = %call.id, "Tool succeeded");
                value.to_string()
            }
            Err(e) => {
                warn!(tool = %name, call_id = %call.id, kind = ?e.kind(), error = %e, "Tool call failed");
                json!({ "error": tool_error_message(&e) }).to_string()
            }
        }
    }
}

fn decode_arguments(arguments: &str) -> ChatResult<JsonValue> {
    if arguments.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(arguments)
        .map_err(|e| ChatError::invalid_input(format!("Tool arguments are not valid JSON: {}", e)))
}

fn tool_error_message(error: &ChatError) -> String {
    match error {
        ChatError::ToolExecution { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::models::{ResponseType, Role};
    use crate::tools::test_support::RecordingProvider;

    fn orchestrator(llm: MockLlmClient) -> (Orchestrator, Arc<MockLlmClient>) {
        let llm = Arc::new(llm);
        let orch = Orchestrator::new(llm.clone(), Arc::new(RecordingProvider::default()));
        (orch, llm)
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let (mut orch, llm) = orchestrator(MockLlmClient::new().with_text("hello"));
        let response = orch.chat("hi").await.unwrap();

        assert_eq!(response.response_type, ResponseType::Text);
        assert_eq!(response.description, "hello");
        assert_eq!(llm.call_count(), 1);

        let roles: Vec<Role> = orch.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let llm = MockLlmClient::new()
            .with_tool_call("call_1", "run_sql", r#"{"sql":"SELECT n FROM t"}"#)
            .with_text(r#"{"response_type":"table","description":"one row"}"#);
        let (mut orch, llm) = orchestrator(llm);

        let response = orch.chat("count rows").await.unwrap();
        assert_eq!(response.response_type, ResponseType::Table);
        assert_eq!(llm.call_count(), 2);

        let tool_msg = &orch.history()[3];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_msg.name.as_deref(), Some("run_sql"));
        let payload: JsonValue = serde_json::from_str(&tool_msg.content).unwrap();
        assert_eq!(payload["sql"], "SELECT n FROM t LIMIT 1000");

        // Second model call saw the tool output
        let trace = llm.trace();
        assert_eq!(trace[1].last_message.as_ref().map(|m| m.role), Some(Role::Tool));
        assert_eq!(trace[1].tool_names.len(), 5);
    }

    #[tokio::test]
    async fn test_round_cap() {
        let (mut orch, llm) = orchestrator(MockLlmClient::always_calling("list_tables", "{}"));
        let err = orch.chat("loop forever").await.unwrap_err();

        assert!(matches!(err, ChatError::MaxIterationsExceeded { iterations: 5 }));
        assert_eq!(llm.call_count(), 5);
    }

    #[tokio::test]
    async fn test_bad_arguments_become_tool_error() {
        let llm = MockLlmClient::new()
            .with_tool_call("call_1", "describe_table", "{not json")
            .with_text("sorry");
        let (mut orch, _) = orchestrator(llm);

        orch.chat("describe").await.unwrap();
        let payload: JsonValue = serde_json::from_str(&orch.history()[3].content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_fatal() {
        let llm = MockLlmClient::new()
            .with_tool_call("call_1", "format_disk", "{}")
            .with_text("done");
        let (mut orch, _) = orchestrator(llm);

        let response = orch.chat("go").await.unwrap();
        assert_eq!(response.description, "done");
        let payload: JsonValue = serde_json::from_str(&orch.history()[3].content).unwrap();
        assert_eq!(payload["error"], "Tool not found: format_disk");
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal_and_chat_or_error_reports_it() {
        let llm = MockLlmClient::new().with_error(ChatError::llm_transport("HTTP 500", Some(500)));
        let (mut orch, _) = orchestrator(llm);

        let response = orch.chat_or_error("hi").await;
        assert_eq!(response.response_type, ResponseType::Text);
        assert!(response.description.starts_with("Error: "));
        assert!(response.description.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_schema_update_resets_history() {
        let (mut orch, _) = orchestrator(MockLlmClient::new().with_text("a"));
        orch.chat("first").await.unwrap();
        assert_eq!(orch.history().len(), 3);

        orch.set_schema_metadata(
            DatabaseMetadata::new().with_table(crate::models::TableMetadata::new("customers")),
        );
        assert_eq!(orch.history().len(), 1);
        assert_eq!(orch.history()[0].role, Role::System);
        assert!(orch.history()[0].content.contains("customers ()"));
        assert!(orch.schema_metadata().is_some());
    }

    #[test]
    fn test_max_iterations_floor() {
        let (orch, _) = orchestrator(MockLlmClient::new());
        assert_eq!(orch.with_max_iterations(0).max_iterations(), 1);
    }
}
