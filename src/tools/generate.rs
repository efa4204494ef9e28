//! `generate_sql`: lets the model announce the SQL it is about to draft.
//!
//! Nothing is generated here; the handler acknowledges the request so the
//! model can carry on to `explain_sql` or `run_sql`.

use crate::error::ChatResult;
use crate::tools::{ParameterSchema, ToolContext, ToolDefinition, ToolHandler, ToolId, parse_params, to_json};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateSqlInput {
    pub description: String,
    #[serde(default)]
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateSqlOutput {
    pub message: String,
    pub description: String,
    pub tables: Vec<String>,
}

pub struct GenerateSqlHandler;

#[async_trait]
impl ToolHandler for GenerateSqlHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolId::GenerateSql,
            "Record the intent of a SQL query before writing it. Returns an acknowledgement.",
            ParameterSchema::new()
                .required("description", "string", "What the query should return")
                .array_of("tables", "string", "Tables the query is expected to use"),
        )
    }

    async fn call(&self, _ctx: &ToolContext, params: JsonValue) -> ChatResult<JsonValue> {
        let input: GenerateSqlInput = parse_params(ToolId::GenerateSql, params)?;
        to_json(&GenerateSqlOutput {
            message: "SQL generation requested. Write the query, then validate it with explain_sql or execute it with run_sql.".to_string(),
            description: input.description,
            tables: input.tables,
        })
    }
}
