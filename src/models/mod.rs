//! Data models for the database chat engine.
//!
//! This module re-exports all model types used throughout the application.

pub mod chat;
pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use chat::{ChatResponse, FunctionCall, Message, ResponseType, Role, ToolCall};
pub use connection::{DatabaseType, mask_connection_string};
pub use query::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, FieldInfo, MAX_ROW_LIMIT, QueryParam,
    QueryResult, effective_limit,
};
pub use schema::{ColumnMetadata, DatabaseMetadata, ForeignKeyMetadata, TableMetadata};
