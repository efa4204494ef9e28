//! `run_sql`: the only tool that touches data.
//!
//! Every statement passes [`sql_validator::validate_safe`] under the
//! registry's current mode first. SELECTs without a LIMIT get one appended.

use crate::error::{ChatError, ChatResult};
use crate::models::{FieldInfo, effective_limit};
use crate::tools::sql_validator;
use crate::tools::{ParameterSchema, ToolContext, ToolDefinition, ToolHandler, ToolId, parse_params, to_json};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct RunSqlInput {
    pub sql: String,
    /// Row limit for SELECTs without one. Default: 1000, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSqlOutput {
    /// Statement actually sent to the database
    pub sql: String,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    pub fields: Vec<FieldInfo>,
    /// True when a LIMIT was appended to the statement
    pub limited: bool,
    /// True when the provider's row cap cut the result short
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    pub execution_time_ms: u64,
}

pub struct RunSqlHandler;

#[async_trait]
impl ToolHandler for RunSqlHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolId::RunSql,
            "Execute SQL against the database and return the rows. Write statements are rejected while read-only mode is on.",
            ParameterSchema::new()
                .required("sql", "string", "SQL statement to execute")
                .optional(
                    "limit",
                    "integer",
                    "Maximum rows for a SELECT without LIMIT. Default: 1000",
                ),
        )
    }

    async fn call(&self, ctx: &ToolContext, params: JsonValue) -> ChatResult<JsonValue> {
        let input: RunSqlInput = parse_params(ToolId::RunSql, params)?;

        let check = sql_validator::validate_safe(&input.sql, ctx.read_only);
        if !check.safe {
            let reason = check.reason.unwrap_or_default();
            warn!(sql = %input.sql, reason = %reason, read_only = ctx.read_only, "Blocked SQL");
            return Err(ChatError::safety_violation(reason));
        }

        let analysis = sql_validator::analyze(&input.sql);
        let sql = if analysis.is_select() {
            sql_validator::add_limit(&input.sql, effective_limit(input.limit))
        } else {
            input.sql.clone()
        };
        let limited = sql != input.sql;

        let result = ctx.provider.run_query(&sql, &[]).await?;

        info!(
            statement_type = %analysis.statement_type,
            row_count = result.row_count,
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "SQL executed"
        );

        to_json(&RunSqlOutput {
            sql,
            row_count: result.row_count,
            rows: result.rows,
            fields: result.fields,
            limited,
            truncated: result.truncated,
            rows_affected: result.rows_affected,
            execution_time_ms: result.execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tools::test_support::RecordingProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx(provider: Arc<RecordingProvider>, read_only: bool) -> ToolContext {
        ToolContext {
            provider,
            schema_metadata: None,
            read_only,
        }
    }

    #[tokio::test]
    async fn test_select_gets_default_limit() {
        let provider = Arc::new(RecordingProvider::default());
        let out = RunSqlHandler
            .call(&ctx(provider.clone(), true), json!({ "sql": "SELECT * FROM t" }))
            .await
            .unwrap();

        assert_eq!(out["sql"], "SELECT * FROM t LIMIT 1000");
        assert_eq!(out["limited"], true);
        assert_eq!(out["row_count"], 1);
        assert_eq!(out["fields"][0]["name"], "n");
        assert_eq!(
            provider.executed.lock().unwrap().as_slice(),
            ["SELECT * FROM t LIMIT 1000"]
        );
    }

    #[tokio::test]
    async fn test_explicit_limit_param_and_existing_limit() {
        let provider = Arc::new(RecordingProvider::default());
        let out = RunSqlHandler
            .call(
                &ctx(provider.clone(), true),
                json!({ "sql": "SELECT * FROM t", "limit": 5 }),
            )
            .await
            .unwrap();
        assert_eq!(out["sql"], "SELECT * FROM t LIMIT 5");

        let out = RunSqlHandler
            .call(&ctx(provider, true), json!({ "sql": "SELECT * FROM t LIMIT 3" }))
            .await
            .unwrap();
        assert_eq!(out["sql"], "SELECT * FROM t LIMIT 3");
        assert_eq!(out["limited"], false);
    }

    #[tokio::test]
    async fn test_write_blocked_in_read_only_mode() {
        let provider = Arc::new(RecordingProvider::default());
        let err = RunSqlHandler
            .call(&ctx(provider.clone(), true), json!({ "sql": "DELETE FROM customers" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyViolation);
        assert!(provider.executed.lock().unwrap().is_empty());

        let out = RunSqlHandler
            .call(&ctx(provider.clone(), false), json!({ "sql": "DELETE FROM customers" }))
            .await
            .unwrap();
        assert_eq!(out["limited"], false);
        assert_eq!(provider.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stacked_drop_blocked_in_any_mode() {
        let provider = Arc::new(RecordingProvider::default());
        for read_only in [true, false] {
            let err = RunSqlHandler
                .call(
                    &ctx(provider.clone(), read_only),
                    json!({ "sql": "SELECT 1; DROP TABLE customers" }),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::SafetyViolation);
        }
        assert!(provider.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_sql_param() {
        let provider = Arc::new(RecordingProvider::default());
        let err = RunSqlHandler
            .call(&ctx(provider, true), json!({ "limit": 5 }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
