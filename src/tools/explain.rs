//! `explain_sql`: static analysis of SQL text, no database round-trip.

use crate::error::ChatResult;
use crate::tools::sql_validator::{self, SqlAnalysis};
use crate::tools::{ParameterSchema, ToolContext, ToolDefinition, ToolHandler, ToolId, parse_params, to_json};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct ExplainSqlInput {
    pub sql: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainSqlOutput {
    pub sql: String,
    #[serde(flatten)]
    pub analysis: SqlAnalysis,
    /// Whether `run_sql` would accept this text under the current mode
    pub would_execute: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

pub struct ExplainSqlHandler;

#[async_trait]
impl ToolHandler for ExplainSqlHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolId::ExplainSql,
            "Analyze SQL without running it: validity, statement type, read-only status and referenced tables.",
            ParameterSchema::new().required("sql", "string", "SQL text to analyze"),
        )
    }

    async fn call(&self, ctx: &ToolContext, params: JsonValue) -> ChatResult<JsonValue> {
        let input: ExplainSqlInput = parse_params(ToolId::ExplainSql, params)?;
        let analysis = sql_validator::analyze(&input.sql);
        let check = sql_validator::validate_safe(&input.sql, ctx.read_only);
        debug!(statement_type = %analysis.statement_type, safe = check.safe, "Explained SQL");

        to_json(&ExplainSqlOutput {
            sql: input.sql,
            analysis,
            would_execute: check.safe,
            blocked_reason: check.reason,
        })
    }
}
