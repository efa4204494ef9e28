//! The database capability consumed by tools and the scanner.

use crate::config::DatabaseConfig;
use crate::db::executor::QueryExecutor;
use crate::db::pool::DbPool;
use crate::db::schema::SchemaInspector;
use crate::error::ChatResult;
use crate::models::{DatabaseType, ForeignKeyMetadata, QueryParam, QueryResult, TableMetadata};
use crate::tools::sql_validator;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Uniform access to one database, whatever the engine.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    fn db_type(&self) -> DatabaseType;

    /// Name of the connected database, when known.
    fn database_name(&self) -> Option<&str> {
        None
    }

    async fn list_schemas(&self) -> ChatResult<Vec<String>>;

    /// Bare table names in `schema`, or the engine's default schema.
    async fn list_tables(&self, schema: Option<&str>) -> ChatResult<Vec<String>>;

    async fn describe_table(&self, name: &str, schema: Option<&str>) -> ChatResult<TableMetadata>;

    async fn get_foreign_keys(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> ChatResult<Vec<ForeignKeyMetadata>>;

    /// Run any statement. Row-returning statements yield rows; writes yield `rows_affected`.
    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> ChatResult<QueryResult>;

    async fn test_connection(&self) -> bool;
}

/// [`DatabaseProvider`] backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct SqlProvider {
    pool: DbPool,
    executor: QueryExecutor,
    database_name: Option<String>,
}

impl SqlProvider {
    /// Connect using `config`; every statement runs under `query_timeout` and the row cap.
    pub async fn connect(
        config: &DatabaseConfig,
        query_timeout: Duration,
        row_limit: u32,
    ) -> ChatResult<Self> {
        let pool = DbPool::connect(config).await?;
        let mut provider = Self::from_pool(pool, QueryExecutor::with_settings(query_timeout, row_limit));
        provider.database_name = config.database.clone();
        Ok(provider)
    }

    pub fn from_pool(pool: DbPool, executor: QueryExecutor) -> Self {
        Self {
            pool,
            executor,
            database_name: None,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseProvider for SqlProvider {
    fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    async fn list_schemas(&self) -> ChatResult<Vec<String>> {
        SchemaInspector::list_schemas(&self.pool).await
    }

    async fn list_tables(&self, schema: Option<&str>) -> ChatResult<Vec<String>> {
        SchemaInspector::list_tables(&self.pool, schema).await
    }

    async fn describe_table(&self, name: &str, schema: Option<&str>) -> ChatResult<TableMetadata> {
        SchemaInspector::describe_table(&self.pool, name, schema).await
    }

    async fn get_foreign_keys(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> ChatResult<Vec<ForeignKeyMetadata>> {
        SchemaInspector::foreign_keys(&self.pool, name, schema).await
    }

    async fn run_query(&self, sql: &str, params: &[QueryParam]) -> ChatResult<QueryResult> {
        // Unparseable text goes down the fetch path and the engine reports the error
        if sql_validator::analyze(sql).is_read_only {
            self.executor.fetch(&self.pool, sql, params).await
        } else {
            debug!(sql = %sql, "Routing statement to write path");
            self.executor.execute(&self.pool, sql, params).await
        }
    }

    async fn test_connection(&self) -> bool {
        self.pool.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn provider() -> SqlProvider {
        let config = DatabaseConfig::parse("shop=sqlite::memory:?writable=true").unwrap();
        SqlProvider::connect(&config, Duration::from_secs(5), 100)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_query_routes_reads_and_writes() {
        let provider = provider().await;
        assert_eq!(provider.db_type(), DatabaseType::SQLite);
        assert_eq!(provider.database_name(), Some(":memory:"));
        assert!(provider.test_connection().await);

        let created = provider
            .run_query("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)", &[])
            .await
            .unwrap();
        assert_eq!(created.rows_affected, Some(0));

        let inserted = provider
            .run_query(
                "INSERT INTO items (label) VALUES (?)",
                &[QueryParam::String("pen".into())],
            )
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected, Some(1));

        let selected = provider
            .run_query("SELECT label FROM items", &[])
            .await
            .unwrap();
        assert_eq!(selected.row_count, 1);
        assert_eq!(selected.rows[0]["label"], serde_json::json!("pen"));
        assert!(selected.rows_affected.is_none());
    }
}
