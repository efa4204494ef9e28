//! End-to-end tests against a SQLite file.
//!
//! Tests verify that:
//! - The provider creates, writes and reads through sqlx
//! - The scanner output feeds the compact schema context
//! - A scripted conversation runs SQL against the real database
//! - Non-writable connections are read-only at the driver level too

use db_chat::chat::{Orchestrator, render_response};
use db_chat::config::DatabaseConfig;
use db_chat::db::{DatabaseProvider, SqlProvider, scan_database};
use db_chat::llm::MockLlmClient;
use db_chat::models::{QueryParam, ResponseType};
use db_chat::semantic::{find_table, generate_compact_schema};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct TestDb {
    // Keeps the directory alive for the test
    _dir: TempDir,
    path: String,
}

async fn connect(db: &TestDb, writable: bool, row_limit: u32) -> SqlProvider {
    let url = if writable {
        format!("sqlite:{}?writable=true", db.path)
    } else {
        format!("sqlite:{}", db.path)
    };
    let config = DatabaseConfig::parse(&url).unwrap();
    SqlProvider::connect(&config, Duration::from_secs(5), row_limit)
        .await
        .unwrap()
}

/// Shop database with two related tables.
async fn setup_shop() -> (TestDb, SqlProvider) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shop.db").to_str().unwrap().to_string();
    let db = TestDb { _dir: dir, path };

    let provider = connect(&db, true, 1000).await;
    for sql in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL REFERENCES customers(id), total REAL, note TEXT)",
        "INSERT INTO customers (id, email) VALUES (1, 'ada@example.com'), (2, '李雷@example.com'), (3, 'zoë@example.com')",
        "INSERT INTO orders (id, customer_id, total, note) VALUES (10, 1, 9.5, NULL), (11, 2, 20.0, '🎉 first order')",
    ] {
        provider.run_query(sql, &[]).await.unwrap();
    }
    (db, provider)
}

#[tokio::test]
async fn test_scan_produces_compact_schema() {
    let (_db, provider) = setup_shop().await;
    let metadata = scan_database(&provider, None).await.unwrap();

    assert_eq!(metadata.database_name.as_deref(), Some("shop"));
    assert_eq!(metadata.database_type.as_deref(), Some("sqlite"));
    assert_eq!(metadata.tables.len(), 2);

    let compact = generate_compact_schema(&metadata);
    assert!(
        compact
            .lines()
            .any(|l| l == "customers (id INTEGER PK NOT NULL, email TEXT NOT NULL)"),
        "{compact}"
    );

    let orders = find_table(&metadata, "orders").unwrap();
    assert_eq!(orders.foreign_keys.len(), 1);
    assert_eq!(orders.foreign_keys[0].referenced_table, "customers");
    assert!(compact.contains("customer_id INTEGER FK NOT NULL"));
}

#[tokio::test]
async fn test_run_query_reads_unicode_and_nulls() {
    let (_db, provider) = setup_shop().await;

    let result = provider
        .run_query(
            "SELECT o.id, c.email, o.total, o.note FROM orders o JOIN customers c ON c.id = o.customer_id ORDER BY o.id",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(result.row_count, 2);
    assert!(!result.truncated);
    assert_eq!(result.rows[0]["note"], JsonValue::Null);
    assert_eq!(result.rows[1]["email"], "李雷@example.com");
    assert_eq!(result.rows[1]["note"], "🎉 first order");
    assert_eq!(result.rows[0]["total"], json!(9.5));
    let names: Vec<&str> = result.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "total", "note"]);
}

#[tokio::test]
async fn test_run_query_binds_params() {
    let (_db, provider) = setup_shop().await;

    let result = provider
        .run_query(
            "SELECT email FROM customers WHERE id = ?",
            &[QueryParam::Int(3)],
        )
        .await
        .unwrap();
    assert_eq!(result.rows[0]["email"], "zoë@example.com");
}

#[tokio::test]
async fn test_conversation_against_real_database() {
    let (_db, provider) = setup_shop().await;
    let provider = Arc::new(provider);
    let metadata = scan_database(provider.as_ref(), None).await.unwrap();

    let llm = Arc::new(
        MockLlmClient::new()
            .with_tool_call(
                "call_1",
                "run_sql",
                r#"{"sql":"SELECT id, email FROM customers ORDER BY id"}"#,
            )
            .with_text(
                r#"{"response_type":"table","description":"All customers","data":[{"id":1,"email":"ada@example.com"}],"sql":"SELECT id, email FROM customers ORDER BY id"}"#,
            ),
    );
    let mut orch = Orchestrator::new(llm, provider.clone());
    orch.set_schema_metadata(metadata);

    let response = orch.chat("list customers").await.unwrap();
    assert_eq!(response.response_type, ResponseType::Table);

    let tool: JsonValue = serde_json::from_str(&orch.history()[3].content).unwrap();
    assert_eq!(tool["sql"], "SELECT id, email FROM customers ORDER BY id LIMIT 1000");
    assert_eq!(tool["row_count"], 3);
    assert_eq!(tool["limited"], true);
    assert_eq!(tool["rows"][2]["email"], "zoë@example.com");

    let rendered = render_response(&response);
    assert!(rendered.contains("| ada@example.com |"));
    assert!(rendered.ends_with("SQL: SELECT id, email FROM customers ORDER BY id"));
}

#[tokio::test]
async fn test_row_cap_marks_result_truncated() {
    let (db, writer) = setup_shop().await;
    writer.close().await;
    let provider = connect(&db, false, 2).await;

    let result = provider
        .run_query("SELECT id FROM customers ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(result.row_count, 2);
    assert!(result.truncated);
}

#[tokio::test]
async fn test_read_only_connection_rejects_writes() {
    let (db, writer) = setup_shop().await;
    writer.close().await;
    let provider = connect(&db, false, 1000).await;

    assert!(provider.test_connection().await);
    let err = provider
        .run_query("DELETE FROM customers", &[])
        .await
        .unwrap_err();
    assert!(
        err.to_string().to_lowercase().contains("readonly")
            || err.to_string().to_lowercase().contains("read-only"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_missing_table_describe_is_schema_error() {
    let (_db, provider) = setup_shop().await;
    let err = provider.describe_table("ghosts", None).await.unwrap_err();
    assert!(err.to_string().contains("ghosts"));
}
