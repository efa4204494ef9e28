//! Query execution engine.
//!
//! Reads are streamed and stop after `row_limit + 1` rows so an oversized
//! result never lands in memory; the extra row only tells us the result was
//! truncated. Every statement runs under the configured timeout.
//!
//! The `mysql`, `postgres` and `sqlite` submodules are generated by one
//! macro; only the pool, row and binder types differ.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{ChatError, ChatResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryParam, QueryResult};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Executes statements against a [`DbPool`] with a row cap and a timeout.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    query_timeout: Duration,
    row_limit: u32,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Row limit is clamped to `1..=MAX_ROW_LIMIT`.
    pub fn with_settings(query_timeout: Duration, row_limit: u32) -> Self {
        Self {
            query_timeout,
            row_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Run a row-returning statement.
    pub async fn fetch(
        &self,
        pool: &DbPool,
        sql: &str,
        params: &[QueryParam],
    ) -> ChatResult<QueryResult> {
        let start = Instant::now();
        debug!(
            sql = %sql,
            params = params.len(),
            limit = self.row_limit,
            timeout_secs = self.query_timeout.as_secs(),
            "Executing query"
        );

        let max_rows = self.row_limit as usize + 1;
        let limit = self.query_timeout;
        let row_limit = self.row_limit;
        Ok(match pool {
            DbPool::MySql(p) => {
                let rows = mysql::fetch_rows(p, sql, params, max_rows, limit).await?;
                summarize(rows, row_limit, start)
            }
            DbPool::Postgres(p) => {
                let rows = postgres::fetch_rows(p, sql, params, max_rows, limit).await?;
                summarize(rows, row_limit, start)
            }
            DbPool::SQLite(p) => {
                let rows = sqlite::fetch_rows(p, sql, params, max_rows, limit).await?;
                summarize(rows, row_limit, start)
            }
        })
    }

    /// Run a write statement and report the affected row count.
    pub async fn execute(
        &self,
        pool: &DbPool,
        sql: &str,
        params: &[QueryParam],
    ) -> ChatResult<QueryResult> {
        let start = Instant::now();
        debug!(
            sql = %sql,
            params = params.len(),
            timeout_secs = self.query_timeout.as_secs(),
            "Executing write operation"
        );

        let rows_affected = match pool {
            DbPool::MySql(p) => mysql::execute_write(p, sql, params, self.query_timeout).await?,
            DbPool::Postgres(p) => postgres::execute_write(p, sql, params, self.query_timeout).await?,
            DbPool::SQLite(p) => sqlite::execute_write(p, sql, params, self.query_timeout).await?,
        };

        Ok(QueryResult::write_result(
            rows_affected,
            start.elapsed().as_millis() as u64,
        ))
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the result from up to `row_limit + 1` fetched rows.
fn summarize<R: RowToJson>(rows: Vec<R>, row_limit: u32, start: Instant) -> QueryResult {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let keep = row_limit as usize;
    let truncated = rows.len() > keep;
    if truncated {
        warn!(limit = row_limit, "Query result truncated");
    }

    let fields = rows.first().map(RowToJson::field_infos).unwrap_or_default();
    let json_rows = rows[..rows.len().min(keep)]
        .iter()
        .map(RowToJson::to_json_map)
        .collect();
    QueryResult::from_rows(json_rows, fields, truncated, elapsed_ms)
}

fn timeout_error(operation: &str, limit: Duration) -> ChatError {
    ChatError::timeout(operation, limit.as_secs() as u32)
}

/// Generates the read and write entry points for one engine.
macro_rules! engine {
    ($module:ident, $pool:ty, $row:ty, $bind:path) => {
        mod $module {
            use super::*;
            use sqlx::Executor;

            pub(super) async fn fetch_rows(
                pool: &$pool,
                sql: &str,
                params: &[QueryParam],
                max_rows: usize,
                limit: Duration,
            ) -> ChatResult<Vec<$row>> {
                // Unprepared path for parameterless SQL; some statements refuse preparation
                let stream = if params.is_empty() {
                    pool.fetch(sql)
                } else {
                    params.iter().fold(sqlx::query(sql), $bind).fetch(pool)
                };
                let results = timeout(limit, stream.take(max_rows).collect::<Vec<_>>())
                    .await
                    .map_err(|_| timeout_error("query execution", limit))?;
                results
                    .into_iter()
                    .map(|r| r.map_err(ChatError::from))
                    .collect()
            }

            pub(super) async fn execute_write(
                pool: &$pool,
                sql: &str,
                params: &[QueryParam],
                limit: Duration,
            ) -> ChatResult<u64> {
                let outcome = if params.is_empty() {
                    timeout(limit, pool.execute(sql)).await
                } else {
                    let query = params.iter().fold(sqlx::query(sql), $bind);
                    timeout(limit, query.execute(pool)).await
                };
                let done = outcome.map_err(|_| timeout_error("write operation", limit))??;
                Ok(done.rows_affected())
            }
        }
    };
}

engine!(mysql, sqlx::MySqlPool, sqlx::mysql::MySqlRow, bind_mysql_param);
engine!(postgres, sqlx::PgPool, sqlx::postgres::PgRow, bind_postgres_param);
engine!(sqlite, sqlx::SqlitePool, sqlx::sqlite::SqliteRow, bind_sqlite_param);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    async fn memory_pool() -> DbPool {
        let config = DatabaseConfig::parse("sqlite::memory:?writable=true").unwrap();
        DbPool::connect(&config).await.unwrap()
    }

    #[test]
    fn test_executor_limit_clamped() {
        assert_eq!(QueryExecutor::with_settings(Duration::from_secs(5), 0).row_limit(), 1);
        assert_eq!(
            QueryExecutor::with_settings(Duration::from_secs(5), 99999).row_limit(),
            MAX_ROW_LIMIT
        );
        assert_eq!(QueryExecutor::new().row_limit(), DEFAULT_ROW_LIMIT);
    }

    #[tokio::test]
    async fn test_fetch_truncates_at_limit() {
        let pool = memory_pool().await;
        let executor = QueryExecutor::with_settings(Duration::from_secs(5), 2);

        executor
            .execute(&pool, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        let inserted = executor
            .execute(&pool, "INSERT INTO t (name) VALUES ('a'), ('b'), ('c')", &[])
            .await
            .unwrap();
        assert_eq!(inserted.rows_affected, Some(3));

        let result = executor
            .fetch(&pool, "SELECT id, name FROM t ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(result.row_count, 2);
        assert!(result.truncated);
        assert_eq!(result.fields.len(), 2);
        assert_eq!(result.rows[0]["name"], serde_json::json!("a"));
    }

    #[tokio::test]
    async fn test_fetch_with_params() {
        let pool = memory_pool().await;
        let executor = QueryExecutor::new();

        let result = executor
            .fetch(
                &pool,
                "SELECT ? AS a, ? AS b",
                &[QueryParam::Int(7), QueryParam::String("x".into())],
            )
            .await
            .unwrap();
        assert_eq!(result.row_count, 1);
        assert!(!result.truncated);
        assert_eq!(result.rows[0]["a"], serde_json::json!(7));
        assert_eq!(result.rows[0]["b"], serde_json::json!("x"));
    }

    #[tokio::test]
    async fn test_fetch_invalid_sql_is_database_error() {
        let pool = memory_pool().await;
        let err = QueryExecutor::new()
            .fetch(&pool, "SELECT * FROM no_such_table", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Database { .. }));
    }
}
