//! Query-related data models.
//!
//! This module defines the parameter and result types passed across the
//! database provider capability.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit applied to SELECT statements that carry no LIMIT.
pub const DEFAULT_ROW_LIMIT: u32 = 1000;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Clamp a requested limit into `1..=MAX_ROW_LIMIT`, defaulting when absent.
pub fn effective_limit(requested: Option<u32>) -> u32 {
    requested
        .map(|l| l.clamp(1, MAX_ROW_LIMIT))
        .unwrap_or(DEFAULT_ROW_LIMIT)
}

/// Positional value bound to a `?`/`$n` placeholder.
///
/// Untagged, so plain JSON scalars deserialize directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Name and engine type of one result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    /// Set when the provider's row cap cut the result short
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl QueryResult {
    /// Build a result from decoded rows.
    pub fn from_rows(
        rows: Vec<serde_json::Map<String, JsonValue>>,
        fields: Vec<FieldInfo>,
        truncated: bool,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            fields,
            truncated,
            execution_time_ms,
            rows_affected: None,
        }
    }

    /// Result of a statement that returns no rows.
    pub fn write_result(rows_affected: u64, execution_time_ms: u64) -> Self {
        Self {
            rows_affected: Some(rows_affected),
            execution_time_ms,
            ..Self::default()
        }
    }
}
