//! Schema formatting for LLM context.
//!
//! Renders [`DatabaseMetadata`] into the compact one-line-per-table form used
//! in the system prompt and into a longer Markdown report. Output follows
//! metadata order so the same metadata always yields the same text.

use crate::models::{DatabaseMetadata, TableMetadata};
use std::fmt::Write as _;

/// Schema label used when a table carries none.
const DEFAULT_SCHEMA_LABEL: &str = "default";

/// One line per table: `name (col TYPE [PK] [FK] [NOT NULL], ...)`.
pub fn generate_compact_schema(metadata: &DatabaseMetadata) -> String {
    metadata
        .tables
        .iter()
        .map(compact_table_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn compact_table_line(table: &TableMetadata) -> String {
    let columns = table
        .columns
        .iter()
        .map(|column| {
            let mut part = format!("{} {}", column.name, column.data_type);
            if column.is_primary_key {
                part.push_str(" PK");
            }
            if table.column_is_foreign_key(column) {
                part.push_str(" FK");
            }
            if !column.nullable {
                part.push_str(" NOT NULL");
            }
            part
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("{} ({})", table.qualified_name(), columns)
}

/// Markdown report grouped by schema, ending with the relationship list.
pub fn generate_schema_summary(metadata: &DatabaseMetadata) -> String {
    let mut out = String::from("# Database Schema\n");

    if let Some(name) = &metadata.database_name {
        let _ = writeln!(out, "Database: {}", name);
    }
    if let Some(db_type) = &metadata.database_type {
        let _ = writeln!(out, "Type: {}", db_type);
    }
    let _ = writeln!(out, "Tables: {}", metadata.tables.len());

    for (schema, tables) in group_by_schema(metadata) {
        let _ = write!(out, "\n## Schema: {}\n", schema);
        for table in tables {
            write_table_section(&mut out, table);
        }
    }

    let relationships: Vec<String> = metadata
        .tables
        .iter()
        .flat_map(|table| {
            table.foreign_keys.iter().map(move |fk| {
                format!(
                    "- {} → {} (via {})",
                    table.name, fk.referenced_table, fk.column_name
                )
            })
        })
        .collect();

    if !relationships.is_empty() {
        out.push_str("\n## Relationships\n");
        for line in relationships {
            out.push_str(&line);
            out.push('\n');
        }
    }

    out
}

fn write_table_section(out: &mut String, table: &TableMetadata) {
    let _ = write!(out, "\n### {}\n", table.name);
    if let Some(comment) = &table.comment {
        let _ = writeln!(out, "{}", comment);
    }

    out.push_str("Columns:\n");
    for column in &table.columns {
        let mut flags = Vec::new();
        if column.is_primary_key {
            flags.push("PK");
        }
        if table.column_is_foreign_key(column) {
            flags.push("FK");
        }
        if !column.nullable {
            flags.push("NOT NULL");
        }

        let _ = write!(out, "- {}: {}", column.name, column.data_type);
        if !flags.is_empty() {
            let _ = write!(out, " ({})", flags.join(", "));
        }
        if let Some(default) = &column.default_value {
            let _ = write!(out, " default {}", default);
        }
        if let Some(comment) = &column.comment {
            let _ = write!(out, " -- {}", comment);
        }
        out.push('\n');
    }

    if !table.foreign_keys.is_empty() {
        out.push_str("Foreign keys:\n");
        for fk in &table.foreign_keys {
            let target = match &fk.referenced_schema {
                Some(schema) => format!("{}.{}", schema, fk.referenced_table),
                None => fk.referenced_table.clone(),
            };
            let _ = writeln!(
                out,
                "- {} → {}.{}",
                fk.column_name, target, fk.referenced_column
            );
        }
    }
}

/// Tables grouped by schema, groups in first-seen order.
fn group_by_schema(metadata: &DatabaseMetadata) -> Vec<(&str, Vec<&TableMetadata>)> {
    let mut groups: Vec<(&str, Vec<&TableMetadata>)> = Vec::new();
    for table in &metadata.tables {
        let schema = table
            .schema
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCHEMA_LABEL);
        match groups.iter_mut().find(|(name, _)| *name == schema) {
            Some((_, tables)) => tables.push(table),
            None => groups.push((schema, vec![table])),
        }
    }
    groups
}

/// Look a table up by bare name, `schema.name`, or a lookup name ending in
/// `.name` (so `main.customers` finds a schema-less `customers`).
///
/// Exact matches are preferred over suffix matches; within each rule the
/// first table in metadata order wins.
pub fn find_table<'a>(metadata: &'a DatabaseMetadata, name: &str) -> Option<&'a TableMetadata> {
    let exact = metadata
        .tables
        .iter()
        .find(|table| table.name == name || table.qualified_name() == name);

    exact.or_else(|| {
        metadata.tables.iter().find(|table| {
            name.strip_suffix(table.name.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
        })
    })
}

/// Qualified names of all tables, in metadata order.
pub fn generate_tables_list(metadata: &DatabaseMetadata) -> Vec<String> {
    metadata
        .tables
        .iter()
        .map(TableMetadata::qualified_name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnMetadata, ForeignKeyMetadata};

    fn shop() -> DatabaseMetadata {
        DatabaseMetadata::new()
            .with_database_name("shop")
            .with_database_type("sqlite")
            .with_table(
                TableMetadata::new("customers")
                    .with_column(
                        ColumnMetadata::new("id", "INTEGER", false).with_primary_key(true),
                    )
                    .with_column(ColumnMetadata::new("email", "TEXT", false)),
            )
            .with_table(
                TableMetadata::new("orders")
                    .with_schema("sales")
                    .with_column(
                        ColumnMetadata::new("id", "INTEGER", false).with_primary_key(true),
                    )
                    .with_column(ColumnMetadata::new("customer_id", "INTEGER", true))
                    .with_foreign_key(ForeignKeyMetadata::new("customer_id", "customers", "id")),
            )
    }

    #[test]
    fn test_compact_schema_line_format() {
        let compact = generate_compact_schema(&shop());
        let lines: Vec<&str> = compact.lines().collect();
        assert_eq!(lines[0], "customers (id INTEGER PK NOT NULL, email TEXT NOT NULL)");
        assert_eq!(lines[1], "sales.orders (id INTEGER PK NOT NULL, customer_id INTEGER FK)");
    }

    #[test]
    fn test_compact_schema_is_deterministic() {
        assert_eq!(generate_compact_schema(&shop()), generate_compact_schema(&shop()));
        assert_eq!(generate_compact_schema(&DatabaseMetadata::new()), "");
    }

    #[test]
    fn test_summary_groups_and_relationships() {
        let summary = generate_schema_summary(&shop());
        assert!(summary.starts_with("# Database Schema\n"));
        assert!(summary.contains("## Schema: default"));
        assert!(summary.contains("## Schema: sales"));
        assert!(summary.contains("- email: TEXT (NOT NULL)"));
        assert!(summary.ends_with("## Relationships\n- orders → customers (via customer_id)\n"));

        let default_pos = summary.find("## Schema: default").unwrap();
        let sales_pos = summary.find("## Schema: sales").unwrap();
        assert!(default_pos < sales_pos);
    }

    #[test]
    fn test_find_table_variants() {
        let meta = shop();
        assert_eq!(find_table(&meta, "orders").map(|t| t.name.as_str()), Some("orders"));
        assert_eq!(find_table(&meta, "sales.orders").map(|t| t.name.as_str()), Some("orders"));
        assert!(find_table(&meta, "missing").is_none());
        assert!(find_table(&meta, "main.missing").is_none());
    }

    #[test]
    fn test_find_table_by_qualified_suffix() {
        let meta = shop();
        // Schema-less cache entry, as scanned from SQLite
        assert_eq!(
            find_table(&meta, "main.customers").map(|t| t.qualified_name()),
            Some("customers".to_string())
        );
        assert_eq!(
            find_table(&meta, "db.sales.orders").map(|t| t.qualified_name()),
            Some("sales.orders".to_string())
        );
        assert_eq!(
            find_table(&meta, "other.orders").map(|t| t.name.as_str()),
            Some("orders")
        );
        // A shared tail is not enough; the dot must precede the table name
        assert!(find_table(&meta, "mycustomers").is_none());
    }

    #[test]
    fn test_table_section_lists_comment_and_columns() {
        let meta = DatabaseMetadata::new().with_table(
            TableMetadata::new("audit")
                .with_comment("Append-only log")
                .with_column(ColumnMetadata::new("id", "INTEGER", false).with_primary_key(true)),
        );
        let summary = generate_schema_summary(&meta);
        assert!(summary.contains("### audit\nAppend-only log\nColumns:\n- id: INTEGER (PK, NOT NULL)\n"));
    }

    #[test]
    fn test_find_table_first_match_wins() {
        let meta = DatabaseMetadata::new()
            .with_table(TableMetadata::new("events").with_schema("a"))
            .with_table(TableMetadata::new("events").with_schema("b"));
        assert_eq!(
            find_table(&meta, "events").and_then(|t| t.schema.as_deref()),
            Some("a")
        );
        assert_eq!(
            find_table(&meta, "b.events").and_then(|t| t.schema.as_deref()),
            Some("b")
        );
    }

    #[test]
    fn test_tables_list() {
        assert_eq!(generate_tables_list(&shop()), vec!["customers", "sales.orders"]);
    }
}
