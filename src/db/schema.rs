//! Schema introspection for SQLite, PostgreSQL and MySQL.
//!
//! Each engine module aliases its catalog output to [`CatalogColumn`] and
//! [`CatalogForeignKey`], so PostgreSQL and SQLite rows decode with
//! `FromRow`. MySQL reads columns by hand because catalog text may come back
//! as VARBINARY.

use crate::db::pool::DbPool;
use crate::error::{ChatError, ChatResult};
use crate::models::{ColumnMetadata, ForeignKeyMetadata, TableMetadata};
use tracing::debug;

/// Catalog access for a [`DbPool`].
pub struct SchemaInspector;

impl SchemaInspector {
    /// Schema names visible to the connection. SQLite reports its attached databases.
    pub async fn list_schemas(pool: &DbPool) -> ChatResult<Vec<String>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_schemas(p).await,
            DbPool::MySql(p) => mysql::list_schemas(p).await,
            DbPool::SQLite(p) => sqlite::list_schemas(p).await,
        }
    }

    /// Base table names in `schema`, or the connection's default schema.
    pub async fn list_tables(pool: &DbPool, schema: Option<&str>) -> ChatResult<Vec<String>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_tables(p, schema).await,
            DbPool::MySql(p) => mysql::list_tables(p, schema).await,
            DbPool::SQLite(p) => sqlite::list_tables(p).await,
        }
    }

    /// Columns and foreign keys of one table.
    ///
    /// Columns referenced by a foreign key are flagged `is_foreign_key`.
    pub async fn describe_table(
        pool: &DbPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> ChatResult<TableMetadata> {
        let (columns, schema_name) = match pool {
            DbPool::Postgres(p) => {
                let schema_name = schema.unwrap_or("public");
                (
                    postgres::fetch_columns(p, table_name, schema_name).await?,
                    Some(schema_name.to_string()),
                )
            }
            DbPool::MySql(p) => (
                mysql::fetch_columns(p, table_name, schema).await?,
                schema.map(str::to_string),
            ),
            DbPool::SQLite(p) => (sqlite::fetch_columns(p, table_name).await?, None),
        };

        if columns.is_empty() {
            return Err(ChatError::schema(
                format!("Table '{}' not found", table_name),
                table_name,
            ));
        }

        let foreign_keys = Self::foreign_keys(pool, table_name, schema).await?;

        let mut table = TableMetadata::new(table_name);
        if let Some(schema_name) = schema_name {
            table = table.with_schema(schema_name);
        }
        for column in columns {
            let is_fk = foreign_keys.iter().any(|fk| fk.column_name == column.name);
            table = table.with_column(column.with_foreign_key(is_fk));
        }
        for fk in foreign_keys {
            table = table.with_foreign_key(fk);
        }

        debug!(table = %table_name, columns = table.columns.len(), "Described table");
        Ok(table)
    }

    /// Outgoing foreign keys of one table.
    pub async fn foreign_keys(
        pool: &DbPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> ChatResult<Vec<ForeignKeyMetadata>> {
        match pool {
            DbPool::Postgres(p) => {
                postgres::fetch_foreign_keys(p, table_name, schema.unwrap_or("public")).await
            }
            DbPool::MySql(p) => mysql::fetch_foreign_keys(p, table_name, schema).await,
            DbPool::SQLite(p) => sqlite::fetch_foreign_keys(p, table_name).await,
        }
    }
}

/// One catalog column, aliased to the same names by every engine's query.
#[derive(Debug, sqlx::FromRow)]
struct CatalogColumn {
    name: String,
    data_type: String,
    nullable: bool,
    is_primary_key: bool,
    default_value: Option<String>,
    comment: Option<String>,
}

impl From<CatalogColumn> for ColumnMetadata {
    fn from(raw: CatalogColumn) -> Self {
        let mut column = ColumnMetadata::new(raw.name, raw.data_type, raw.nullable)
            .with_primary_key(raw.is_primary_key);
        if let Some(default) = raw.default_value {
            column = column.with_default(default);
        }
        match raw.comment {
            Some(comment) if !comment.is_empty() => column.with_comment(comment),
            _ => column,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogForeignKey {
    column_name: String,
    referenced_schema: Option<String>,
    referenced_table: String,
    /// NULL in SQLite when the parent's primary key is implied
    referenced_column: Option<String>,
}

impl From<CatalogForeignKey> for ForeignKeyMetadata {
    fn from(raw: CatalogForeignKey) -> Self {
        let fk = ForeignKeyMetadata::new(
            raw.column_name,
            raw.referenced_table,
            raw.referenced_column.unwrap_or_default(),
        );
        match raw.referenced_schema {
            Some(schema) => fk.with_referenced_schema(schema),
            None => fk,
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;

    const SCHEMAS: &str = r#"
        SELECT schema_name::text
        FROM information_schema.schemata
        WHERE schema_name NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
          AND schema_name NOT LIKE 'pg_temp_%'
          AND schema_name NOT LIKE 'pg_toast_temp_%'
        ORDER BY schema_name
    "#;

    const TABLES: &str = r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = $1 AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;

    const COLUMNS: &str = r#"
        SELECT
            c.column_name::text AS name,
            format_type(a.atttypid, a.atttypmod) AS data_type,
            (c.is_nullable = 'YES') AS nullable,
            EXISTS (
                SELECT 1
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                  ON kcu.constraint_name = tc.constraint_name
                 AND kcu.table_schema = tc.table_schema
                WHERE tc.constraint_type = 'PRIMARY KEY'
                  AND tc.table_schema = c.table_schema
                  AND tc.table_name = c.table_name
                  AND kcu.column_name = c.column_name
            ) AS is_primary_key,
            c.column_default::text AS default_value,
            col_description(cls.oid, a.attnum) AS comment
        FROM information_schema.columns c
        JOIN pg_namespace ns ON ns.nspname = c.table_schema
        JOIN pg_class cls ON cls.relname = c.table_name AND cls.relnamespace = ns.oid
        JOIN pg_attribute a ON a.attrelid = cls.oid AND a.attname = c.column_name
        WHERE c.table_name = $1 AND c.table_schema = $2
        ORDER BY c.ordinal_position
    "#;

    const FOREIGN_KEYS: &str = r#"
        SELECT
            kcu.column_name::text AS column_name,
            ccu.table_schema::text AS referenced_schema,
            ccu.table_name::text AS referenced_table,
            ccu.column_name::text AS referenced_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
        JOIN information_schema.constraint_column_usage ccu
          ON ccu.constraint_name = tc.constraint_name
         AND ccu.constraint_schema = tc.table_schema
        WHERE tc.constraint_type = 'FOREIGN KEY'
          AND tc.table_name = $1 AND tc.table_schema = $2
        ORDER BY kcu.ordinal_position
    "#;

    pub async fn list_schemas(pool: &PgPool) -> ChatResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(SCHEMAS).fetch_all(pool).await?)
    }

    pub async fn list_tables(pool: &PgPool, schema: Option<&str>) -> ChatResult<Vec<String>> {
        let schema = schema.unwrap_or("public");
        let tables: Vec<String> = sqlx::query_scalar(TABLES)
            .bind(schema)
            .fetch_all(pool)
            .await?;
        debug!(count = tables.len(), %schema, "Listed PostgreSQL tables");
        Ok(tables)
    }

    pub async fn fetch_columns(
        pool: &PgPool,
        table_name: &str,
        schema_name: &str,
    ) -> ChatResult<Vec<ColumnMetadata>> {
        let rows: Vec<CatalogColumn> = sqlx::query_as(COLUMNS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(ColumnMetadata::from).collect())
    }

    pub async fn fetch_foreign_keys(
        pool: &PgPool,
        table_name: &str,
        schema_name: &str,
    ) -> ChatResult<Vec<ForeignKeyMetadata>> {
        let rows: Vec<CatalogForeignKey> = sqlx::query_as(FOREIGN_KEYS)
            .bind(table_name)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(ForeignKeyMetadata::from).collect())
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    const SCHEMAS: &str = r#"
        SELECT CONVERT(SCHEMA_NAME USING utf8) AS name
        FROM information_schema.SCHEMATA
        WHERE SCHEMA_NAME NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        ORDER BY SCHEMA_NAME
    "#;

    const TABLES: &str = r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    const COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS name,
            CONVERT(COLUMN_TYPE USING utf8) AS data_type,
            CONVERT(IS_NULLABLE USING utf8) AS nullable,
            CONVERT(COLUMN_KEY USING utf8) AS column_key,
            CONVERT(COLUMN_DEFAULT USING utf8) AS default_value,
            CONVERT(COLUMN_COMMENT USING utf8) AS comment
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
        ORDER BY ORDINAL_POSITION
    "#;

    const FOREIGN_KEYS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS column_name,
            CONVERT(REFERENCED_TABLE_SCHEMA USING utf8) AS referenced_schema,
            CONVERT(REFERENCED_TABLE_NAME USING utf8) AS referenced_table,
            CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS referenced_column
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())
          AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY ORDINAL_POSITION
    "#;

    /// Catalog text can arrive as VARBINARY depending on the server charset.
    fn text(row: &MySqlRow, column: &str) -> Option<String> {
        if let Ok(value) = row.try_get::<Option<String>, _>(column) {
            return value;
        }
        row.try_get::<Option<Vec<u8>>, _>(column)
            .ok()
            .flatten()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    }

    fn names(rows: &[MySqlRow]) -> Vec<String> {
        rows.iter()
            .filter_map(|row| text(row, "name"))
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub async fn list_schemas(pool: &MySqlPool) -> ChatResult<Vec<String>> {
        let rows = sqlx::query(SCHEMAS).fetch_all(pool).await?;
        Ok(names(&rows))
    }

    pub async fn list_tables(pool: &MySqlPool, schema: Option<&str>) -> ChatResult<Vec<String>> {
        let rows = sqlx::query(TABLES).bind(schema).fetch_all(pool).await?;
        let tables = names(&rows);
        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn fetch_columns(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> ChatResult<Vec<ColumnMetadata>> {
        let rows = sqlx::query(COLUMNS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                ColumnMetadata::from(CatalogColumn {
                    name: text(row, "name").unwrap_or_default(),
                    data_type: text(row, "data_type").unwrap_or_default(),
                    nullable: text(row, "nullable").as_deref() == Some("YES"),
                    is_primary_key: text(row, "column_key").as_deref() == Some("PRI"),
                    default_value: text(row, "default_value"),
                    comment: text(row, "comment"),
                })
            })
            .collect())
    }

    pub async fn fetch_foreign_keys(
        pool: &MySqlPool,
        table_name: &str,
        schema: Option<&str>,
    ) -> ChatResult<Vec<ForeignKeyMetadata>> {
        let rows = sqlx::query(FOREIGN_KEYS)
            .bind(table_name)
            .bind(schema)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                ForeignKeyMetadata::from(CatalogForeignKey {
                    column_name: text(row, "column_name").unwrap_or_default(),
                    referenced_schema: text(row, "referenced_schema"),
                    referenced_table: text(row, "referenced_table").unwrap_or_default(),
                    referenced_column: text(row, "referenced_column"),
                })
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;

    const SCHEMAS: &str = "SELECT name FROM pragma_database_list ORDER BY seq";

    const TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;

    // INTEGER PRIMARY KEY is a rowid alias and never NULL
    const COLUMNS: &str = r#"
        SELECT
            name,
            type AS data_type,
            ("notnull" = 0 AND pk = 0) AS nullable,
            (pk > 0) AS is_primary_key,
            dflt_value AS default_value,
            NULL AS comment
        FROM pragma_table_info(?)
        ORDER BY cid
    "#;

    const FOREIGN_KEYS: &str = r#"
        SELECT
            "from" AS column_name,
            NULL AS referenced_schema,
            "table" AS referenced_table,
            "to" AS referenced_column
        FROM pragma_foreign_key_list(?)
        ORDER BY id, seq
    "#;

    pub async fn list_schemas(pool: &SqlitePool) -> ChatResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(SCHEMAS).fetch_all(pool).await?)
    }

    pub async fn list_tables(pool: &SqlitePool) -> ChatResult<Vec<String>> {
        let tables: Vec<String> = sqlx::query_scalar(TABLES).fetch_all(pool).await?;
        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    pub async fn fetch_columns(pool: &SqlitePool, table_name: &str) -> ChatResult<Vec<ColumnMetadata>> {
        let rows: Vec<CatalogColumn> = sqlx::query_as(COLUMNS)
            .bind(table_name)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(ColumnMetadata::from).collect())
    }

    pub async fn fetch_foreign_keys(
        pool: &SqlitePool,
        table_name: &str,
    ) -> ChatResult<Vec<ForeignKeyMetadata>> {
        let rows: Vec<CatalogForeignKey> = sqlx::query_as(FOREIGN_KEYS)
            .bind(table_name)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(ForeignKeyMetadata::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    async fn shop_pool() -> DbPool {
        let config = DatabaseConfig::parse("sqlite::memory:?writable=true").unwrap();
        let pool = DbPool::connect(&config).await.unwrap();
        let DbPool::SQLite(p) = &pool else {
            unreachable!()
        };
        sqlx::query(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, email TEXT NOT NULL, note TEXT DEFAULT 'n/a')",
        )
        .execute(p)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), total REAL)",
        )
        .execute(p)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_sqlite_list_tables_and_schemas() {
        let pool = shop_pool().await;
        let tables = SchemaInspector::list_tables(&pool, None).await.unwrap();
        assert_eq!(tables, vec!["customers", "orders"]);

        let schemas = SchemaInspector::list_schemas(&pool).await.unwrap();
        assert!(schemas.contains(&"main".to_string()));
    }

    #[tokio::test]
    async fn test_sqlite_describe_table() {
        let pool = shop_pool().await;
        let customers = SchemaInspector::describe_table(&pool, "customers", None)
            .await
            .unwrap();
        assert_eq!(customers.name, "customers");
        assert!(customers.schema.is_none());
        assert_eq!(customers.columns.len(), 3);
        assert!(customers.columns[0].is_primary_key);
        assert!(!customers.columns[0].nullable);
        assert!(!customers.columns[1].nullable);
        assert_eq!(customers.columns[2].default_value.as_deref(), Some("'n/a'"));

        let orders = SchemaInspector::describe_table(&pool, "orders", None)
            .await
            .unwrap();
        assert_eq!(orders.foreign_keys.len(), 1);
        assert_eq!(orders.foreign_keys[0].referenced_table, "customers");
        assert_eq!(orders.foreign_keys[0].referenced_column, "id");
        assert!(orders.columns[1].is_foreign_key);
    }

    #[tokio::test]
    async fn test_sqlite_describe_missing_table() {
        let pool = shop_pool().await;
        let err = SchemaInspector::describe_table(&pool, "nope", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Schema { .. }));
    }
}
