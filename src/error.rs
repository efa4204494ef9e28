//! Error types for the database chat engine.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Errors fall into two groups: those that are recovered at the tool-dispatch
//! boundary and fed back to the model as tool messages (parse, safety, tool and
//! database errors), and those that abort the current chat turn (LLM transport
//! failures and the iteration cap).

use serde::Serialize;
use thiserror::Error;

/// Tagged kind carried across the tool-dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    SafetyViolation,
    ToolNotFound,
    ToolExecutionError,
    LlmTransportError,
    MaxIterationsExceeded,
    Database,
    InvalidInput,
    Internal,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("SQL parse error: {message}")]
    Parse { message: String },

    #[error("Safety violation: {reason}")]
    SafetyViolation { reason: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution {
        tool: String,
        message: String,
        /// Kind of the underlying handler failure
        source_kind: ErrorKind,
    },

    #[error("LLM provider error: {message}")]
    LlmTransport {
        message: String,
        /// HTTP status, when the provider answered at all
        status: Option<u16>,
    },

    #[error("Maximum tool iterations ({iterations}) exceeded without a final answer")]
    MaxIterationsExceeded { iterations: usize },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ChatError {
    /// Create a SQL parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a safety violation error.
    pub fn safety_violation(reason: impl Into<String>) -> Self {
        Self::SafetyViolation {
            reason: reason.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Wrap a handler failure as a tool execution error, keeping the source message.
    pub fn tool_execution(tool: impl Into<String>, source: &ChatError) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: source.to_string(),
            source_kind: source.kind(),
        }
    }

    /// Create an LLM transport error.
    pub fn llm_transport(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::LlmTransport {
            message: message.into(),
            status,
        }
    }

    /// Create an iteration cap error.
    pub fn max_iterations_exceeded(iterations: usize) -> Self {
        Self::MaxIterationsExceeded { iterations }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a session not found error.
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Tagged kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::SafetyViolation { .. } => ErrorKind::SafetyViolation,
            Self::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            Self::ToolExecution { .. } => ErrorKind::ToolExecutionError,
            Self::LlmTransport { .. } => ErrorKind::LlmTransportError,
            Self::MaxIterationsExceeded { .. } => ErrorKind::MaxIterationsExceeded,
            Self::Connection { .. }
            | Self::Database { .. }
            | Self::Schema { .. }
            | Self::Timeout { .. } => ErrorKind::Database,
            Self::InvalidInput { .. } | Self::SessionNotFound { .. } => ErrorKind::InvalidInput,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether this error ends the current chat turn instead of being fed back to the model.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LlmTransport { .. } | Self::MaxIterationsExceeded { .. }
        )
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::SafetyViolation { .. } => {
                Some("Only read-only statements run while read-only mode is enabled")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::LlmTransport { status, .. } => {
                matches!(status, None | Some(429) | Some(502) | Some(503) | Some(504))
            }
            _ => false,
        }
    }
}

/// Advice for a failed statement, phrased so the model can act on it.
fn database_suggestion(code: Option<&str>, message: &str) -> &'static str {
    let message = message.to_ascii_lowercase();
    match code {
        // undefined_table, ER_NO_SUCH_TABLE
        Some("42P01") | Some("1146") => "Call list_tables to see which tables exist",
        // undefined_column, ER_BAD_FIELD_ERROR
        Some("42703") | Some("1054") => "Call describe_table to check the column names",
        Some("42601") | Some("1064") => "Check the SQL syntax for this database dialect",
        _ if message.contains("no such table") => "Call list_tables to see which tables exist",
        _ if message.contains("no such column") => "Call describe_table to check the column names",
        _ if message.contains("readonly") || message.contains("read-only") => {
            "The connection is read-only; reconnect with ?writable=true to modify data"
        }
        _ => "Check the SQL syntax and referenced objects",
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;

        match err {
            E::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                let suggestion = database_suggestion(code.as_deref(), db_err.message());
                ChatError::database(db_err.message(), code, suggestion)
            }
            E::ColumnNotFound(column) => {
                ChatError::schema(format!("Column not found: {column}"), column)
            }
            E::RowNotFound => ChatError::database("No rows returned", None, "Relax the WHERE clause"),
            E::PoolTimedOut => ChatError::timeout("connection pool acquire", 30),
            E::PoolClosed => {
                ChatError::connection("Connection pool is closed", "Restart the session")
            }
            E::Configuration(msg) => ChatError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            E::Io(_) | E::Tls(_) | E::Protocol(_) => ChatError::connection(
                err.to_string(),
                "Check network connectivity and that the database server is up",
            ),
            E::ColumnDecode { .. } | E::Decode(_) => {
                ChatError::internal(format!("Failed to decode result: {err}"))
            }
            other => ChatError::internal(format!("Unexpected database error: {other}")),
        }
    }
}

/// Convert reqwest errors to LLM transport errors.
impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        if err.is_timeout() {
            ChatError::llm_transport(format!("Request to LLM provider timed out: {}", err), None)
        } else {
            ChatError::llm_transport(format!("Request to LLM provider failed: {}", err), status)
        }
    }
}

/// Result type alias for chat engine operations.
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = ChatError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(ChatError::timeout("query", 30).is_retryable());
        assert!(ChatError::connection("err", "sugg").is_retryable());
        assert!(ChatError::llm_transport("rate limited", Some(429)).is_retryable());
        assert!(!ChatError::llm_transport("bad key", Some(401)).is_retryable());
        assert!(!ChatError::safety_violation("write operations not allowed").is_retryable());
    }

    #[test]
    fn test_tool_execution_keeps_source_message_and_kind() {
        let inner = ChatError::safety_violation("write operations not allowed");
        let err = ChatError::tool_execution("run_sql", &inner);
        match &err {
            ChatError::ToolExecution {
                tool,
                message,
                source_kind,
            } => {
                assert_eq!(tool, "run_sql");
                assert!(message.contains("write operations not allowed"));
                assert_eq!(*source_kind, ErrorKind::SafetyViolation);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::ToolExecutionError);
    }

    #[test]
    fn test_fatal_errors() {
        assert!(ChatError::max_iterations_exceeded(5).is_fatal());
        assert!(ChatError::llm_transport("503", Some(503)).is_fatal());
        assert!(!ChatError::tool_not_found("drop_everything").is_fatal());
        assert!(!ChatError::parse("unexpected token").is_fatal());
    }

    #[test]
    fn test_database_suggestion_points_at_catalog_tools() {
        assert!(database_suggestion(Some("42P01"), "relation \"x\" does not exist").contains("list_tables"));
        assert!(database_suggestion(None, "no such column: emial").contains("describe_table"));
        assert!(database_suggestion(None, "attempt to write a readonly database").contains("writable"));
        assert_eq!(
            database_suggestion(Some("23505"), "duplicate key"),
            "Check the SQL syntax and referenced objects"
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::SafetyViolation).unwrap();
        assert_eq!(json, "\"safety_violation\"");
    }
}
