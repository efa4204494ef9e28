//! Schema tools: `list_tables` and `describe_table`.
//!
//! Both answer from the scanned [`DatabaseMetadata`] when the registry holds
//! one, and fall back to the live provider otherwise.

use crate::error::ChatResult;
use crate::models::{DatabaseMetadata, TableMetadata};
use crate::semantic;
use crate::tools::{ParameterSchema, ToolContext, ToolDefinition, ToolHandler, ToolId, parse_params, to_json};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Where a schema answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSource {
    Cache,
    Database,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTablesInput {
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTablesOutput {
    pub tables: Vec<String>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub source: SchemaSource,
}

pub struct ListTablesHandler;

impl ListTablesHandler {
    fn from_cache(metadata: &DatabaseMetadata, schema: Option<&str>) -> Vec<String> {
        match schema {
            Some(schema) => metadata
                .tables
                .iter()
                .filter(|t| t.schema.as_deref() == Some(schema))
                .map(TableMetadata::qualified_name)
                .collect(),
            None => semantic::generate_tables_list(metadata),
        }
    }
}

#[async_trait]
impl ToolHandler for ListTablesHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolId::ListTables,
            "List the tables in the database, optionally restricted to one schema.",
            ParameterSchema::new().optional(
                "schema",
                "string",
                "Schema to list. Omit for the default schema.",
            ),
        )
    }

    async fn call(&self, ctx: &ToolContext, params: JsonValue) -> ChatResult<JsonValue> {
        let input: ListTablesInput = parse_params(ToolId::ListTables, params)?;
        let schema = input.schema.as_deref();

        let (tables, source) = match &ctx.schema_metadata {
            Some(metadata) => (Self::from_cache(metadata, schema), SchemaSource::Cache),
            None => (ctx.provider.list_tables(schema).await?, SchemaSource::Database),
        };

        info!(count = tables.len(), source = ?source, "Listed tables");
        to_json(&ListTablesOutput {
            count: tables.len(),
            tables,
            schema: input.schema,
            source,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DescribeTableInput {
    pub table_name: String,
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescribeTableOutput {
    #[serde(flatten)]
    pub table: TableMetadata,
    pub source: SchemaSource,
}

pub struct DescribeTableHandler;

#[async_trait]
impl ToolHandler for DescribeTableHandler {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            ToolId::DescribeTable,
            "Describe one table: columns with types, nullability, keys and foreign keys.",
            ParameterSchema::new()
                .required("table_name", "string", "Table to describe")
                .optional("schema", "string", "Schema containing the table"),
        )
    }

    async fn call(&self, ctx: &ToolContext, params: JsonValue) -> ChatResult<JsonValue> {
        let input: DescribeTableInput = parse_params(ToolId::DescribeTable, params)?;

        let lookup = match &input.schema {
            Some(schema) => format!("{}.{}", schema, input.table_name),
            None => input.table_name.clone(),
        };
        let cached = ctx
            .schema_metadata
            .as_deref()
            .and_then(|metadata| semantic::find_table(metadata, &lookup))
            .cloned();

        let output = match cached {
            Some(table) => DescribeTableOutput {
                table,
                source: SchemaSource::Cache,
            },
            None => DescribeTableOutput {
                table: ctx
                    .provider
                    .describe_table(&input.table_name, input.schema.as_deref())
                    .await?,
                source: SchemaSource::Database,
            },
        };

        info!(table = %lookup, source = ?output.source, "Described table");
        to_json(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnMetadata;
    use crate::tools::test_support::RecordingProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn context(with_cache: bool) -> ToolContext {
        let live = TableMetadata::new("live_only")
            .with_column(ColumnMetadata::new("id", "INTEGER", false).with_primary_key(true));
        let provider = RecordingProvider {
            tables: vec![live],
            ..Default::default()
        };
        let cache = DatabaseMetadata::new()
            .with_table(TableMetadata::new("customers").with_schema("public"))
            .with_table(TableMetadata::new("events").with_schema("audit"));

        ToolContext {
            provider: Arc::new(provider),
            schema_metadata: with_cache.then(|| Arc::new(cache)),
            read_only: true,
        }
    }

    #[tokio::test]
    async fn test_list_tables_prefers_cache() {
        let out = ListTablesHandler
            .call(&context(true), json!({}))
            .await
            .unwrap();
        assert_eq!(out["tables"], json!(["public.customers", "audit.events"]));
        assert_eq!(out["source"], "cache");

        let out = ListTablesHandler
            .call(&context(true), json!({ "schema": "audit" }))
            .await
            .unwrap();
        assert_eq!(out["tables"], json!(["audit.events"]));
        assert_eq!(out["count"], 1);
    }

    #[tokio::test]
    async fn test_list_tables_falls_back_to_provider() {
        let out = ListTablesHandler
            .call(&context(false), JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(out["tables"], json!(["live_only"]));
        assert_eq!(out["source"], "database");
    }

    #[tokio::test]
    async fn test_describe_table_cache_then_provider() {
        let ctx = context(true);
        let out = DescribeTableHandler
            .call(&ctx, json!({ "table_name": "events", "schema": "audit" }))
            .await
            .unwrap();
        assert_eq!(out["name"], "events");
        assert_eq!(out["source"], "cache");

        let out = DescribeTableHandler
            .call(&ctx, json!({ "table_name": "live_only" }))
            .await
            .unwrap();
        assert_eq!(out["source"], "database");
        assert_eq!(out["columns"][0]["name"], "id");
    }

    #[tokio::test]
    async fn test_describe_missing_table_errors() {
        let result = DescribeTableHandler
            .call(&context(false), json!({ "table_name": "ghost" }))
            .await;
        assert!(result.is_err());
    }
}
