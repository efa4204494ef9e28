//! Conversation data models.
//!
//! `Message` serializes in the OpenAI chat-completions wire shape so that the
//! history can be forwarded to an LLM provider without a second mapping.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Providers send `null` content on tool-call replies
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Tool name, set on `tool` messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Assistant reply requesting tool invocations.
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Tool output answering the call with `tool_call_id`.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// Tool calls carried by this message, empty when there are none.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded parameter object
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Text,
    Table,
    Chart,
    /// Any other label the model chose, kept verbatim
    #[serde(untagged)]
    Other(String),
}

impl ResponseType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Chart => "chart",
            Self::Other(label) => label,
        }
    }
}

/// Final answer of one `chat` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response_type: ResponseType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Additional keys the model emitted
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl ChatResponse {
    /// Plain-text answer wrapping the model's raw reply.
    pub fn text(description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            response_type: ResponseType::Text,
            raw_response: Some(description.clone()),
            description,
            data: None,
            sql: None,
            extra: serde_json::Map::new(),
        }
    }

    /// User-facing text answer for a failed turn.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            response_type: ResponseType::Text,
            description: format!("Error: {}", message),
            data: None,
            sql: None,
            raw_response: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_message_wire_shape() {
        let msg = Message::tool("call_1", "list_tables", "{\"tables\":[]}");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert_eq!(value["name"], "list_tables");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn test_assistant_tool_calls_wire_shape() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "run_sql", r#"{"sql":"SELECT 1"}"#)],
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "run_sql");
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn test_provider_reply_with_null_content() {
        let msg: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_9",
                "type": "function",
                "function": {"name": "list_tables", "arguments": "{}"}
            }]
        }))
        .unwrap();
        assert_eq!(msg.content, "");
        assert_eq!(msg.tool_calls()[0].id, "call_9");
    }

    #[test]
    fn test_response_type_keeps_unknown_labels() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"response_type":"map","description":"x"}"#).unwrap();
        assert_eq!(response.response_type, ResponseType::Other("map".to_string()));
        assert_eq!(response.response_type.as_str(), "map");
    }

    #[test]
    fn test_error_response() {
        let response = ChatResponse::error("provider unavailable");
        assert_eq!(response.response_type, ResponseType::Text);
        assert_eq!(response.description, "Error: provider unavailable");
    }
}
