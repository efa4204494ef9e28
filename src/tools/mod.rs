//! Tool catalog offered to the model.
//!
//! The catalog is closed: every tool is a [`ToolId`] bound to a handler when
//! the registry is built, and lookup never changes afterwards.
//!
//! - `list_tables`, `describe_table`: schema answers, from cached metadata when present
//! - `generate_sql`: acknowledgement that lets the model announce a draft
//! - `explain_sql`: static analysis of SQL text
//! - `run_sql`: gated execution through the database provider
//! - `sql_validator`: classification and safety checks shared by the above

pub mod explain;
pub mod generate;
pub mod query;
pub mod schema;
pub mod sql_validator;

use crate::db::DatabaseProvider;
use crate::error::{ChatError, ChatResult};
use crate::models::DatabaseMetadata;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, warn};

pub use explain::ExplainSqlHandler;
pub use generate::GenerateSqlHandler;
pub use query::RunSqlHandler;
pub use schema::{DescribeTableHandler, ListTablesHandler};

/// Identifier of a built-in tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    ListTables,
    DescribeTable,
    GenerateSql,
    ExplainSql,
    RunSql,
}

impl ToolId {
    /// Catalog order as presented to the model.
    pub const ALL: [ToolId; 5] = [
        ToolId::ListTables,
        ToolId::DescribeTable,
        ToolId::GenerateSql,
        ToolId::ExplainSql,
        ToolId::RunSql,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListTables => "list_tables",
            Self::DescribeTable => "describe_table",
            Self::GenerateSql => "generate_sql",
            Self::ExplainSql => "explain_sql",
            Self::RunSql => "run_sql",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Name, description and parameter schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: JsonValue,
}

impl ToolDefinition {
    pub fn new(id: ToolId, description: impl Into<String>, parameters: ParameterSchema) -> Self {
        Self {
            name: id.name().to_string(),
            description: description.into(),
            parameters: parameters.into_json(),
        }
    }
}

/// Builder for the `{type: "object", properties, required}` parameter shape.
#[derive(Debug, Default)]
pub struct ParameterSchema {
    properties: serde_json::Map<String, JsonValue>,
    required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.required.push(name.to_string());
        self.optional(name, kind, description)
    }

    pub fn optional(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({ "type": kind, "description": description }),
        );
        self
    }

    /// Optional array property; providers reject array schemas without `items`.
    pub fn array_of(mut self, name: &str, item_kind: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({ "type": "array", "items": { "type": item_kind }, "description": description }),
        );
        self
    }

    pub fn into_json(self) -> JsonValue {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// State shared by every handler in one registry.
pub struct ToolContext {
    pub provider: Arc<dyn DatabaseProvider>,
    pub schema_metadata: Option<Arc<DatabaseMetadata>>,
    pub read_only: bool,
}

/// One tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, ctx: &ToolContext, params: JsonValue) -> ChatResult<JsonValue>;
}

/// Decode a handler's typed input from the model's parameter object.
pub(crate) fn parse_params<T: DeserializeOwned>(tool: ToolId, params: JsonValue) -> ChatResult<T> {
    // Models sometimes send `null` for a tool without arguments
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| ChatError::invalid_input(format!("Invalid parameters for {}: {}", tool, e)))
}

pub(crate) fn to_json<T: Serialize>(output: &T) -> ChatResult<JsonValue> {
    serde_json::to_value(output)
        .map_err(|e| ChatError::internal(format!("Failed to serialize tool output: {}", e)))
}

/// The fixed tool catalog plus the context its handlers run in.
pub struct ToolRegistry {
    tools: Vec<(ToolId, Box<dyn ToolHandler>)>,
    definitions: Vec<ToolDefinition>,
    context: ToolContext,
}

impl ToolRegistry {
    /// Registry with every built-in tool; read-only mode on.
    pub fn new(provider: Arc<dyn DatabaseProvider>) -> Self {
        let tools: Vec<(ToolId, Box<dyn ToolHandler>)> = ToolId::ALL
            .into_iter()
            .map(|id| (id, builtin_handler(id)))
            .collect();
        let definitions = tools.iter().map(|(_, h)| h.definition()).collect();

        Self {
            tools,
            definitions,
            context: ToolContext {
                provider,
                schema_metadata: None,
                read_only: true,
            },
        }
    }

    /// Definitions in catalog order.
    pub fn get_tools(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn has_tool(&self, name: &str) -> bool {
        ToolId::from_name(name).is_some()
    }

    /// Run a tool by name.
    ///
    /// Unknown names yield `ToolNotFound`; handler failures are wrapped as
    /// `ToolExecution`, keeping the source message and kind.
    pub async fn execute_tool(&self, name: &str, params: JsonValue) -> ChatResult<JsonValue> {
        let id = ToolId::from_name(name).ok_or_else(|| ChatError::tool_not_found(name))?;
        let handler = self
            .tools
            .iter()
            .find(|(tool_id, _)| *tool_id == id)
            .map(|(_, handler)| handler)
            .ok_or_else(|| ChatError::tool_not_found(name))?;

        debug!(tool = %id, "Executing tool");
        handler.call(&self.context, params).await.map_err(|e| {
            warn!(tool = %id, error = %e, "Tool failed");
            ChatError::tool_execution(id.name(), &e)
        })
    }

    pub fn set_read_only_mode(&mut self, read_only: bool) {
        self.context.read_only = read_only;
    }

    pub fn read_only_mode(&self) -> bool {
        self.context.read_only
    }

    /// Cached metadata used by the schema tools instead of querying the database.
    pub fn set_schema_metadata(&mut self, metadata: Option<Arc<DatabaseMetadata>>) {
        self.context.schema_metadata = metadata;
    }

    pub fn provider(&self) -> &Arc<dyn DatabaseProvider> {
        &self.context.provider
    }
}

fn builtin_handler(id: ToolId) -> Box<dyn ToolHandler> {
    match id {
        ToolId::ListTables => Box::new(ListTablesHandler),
        ToolId::DescribeTable => Box::new(DescribeTableHandler),
        ToolId::GenerateSql => Box::new(GenerateSqlHandler),
        ToolId::ExplainSql => Box::new(ExplainSqlHandler),
        ToolId::RunSql => Box::new(RunSqlHandler),
    }
}
