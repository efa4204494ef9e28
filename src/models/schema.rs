//! Schema metadata models.
//!
//! These types describe a scanned database: the input to the schema formatter
//! and to the tools that answer from cached metadata instead of re-querying.

use serde::{Deserialize, Serialize};

/// Snapshot of a database's tables, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_type: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableMetadata>,
}

impl DatabaseMetadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database name.
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    /// Set the database type label (e.g., "postgresql").
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = Some(db_type.into());
        self
    }

    /// Append a table.
    pub fn with_table(mut self, table: TableMetadata) -> Self {
        self.tables.push(table);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TableMetadata {
    /// Create a new table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            foreign_keys: Vec::new(),
            comment: None,
        }
    }

    /// Set the schema name.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a column.
    pub fn with_column(mut self, column: ColumnMetadata) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, fk: ForeignKeyMetadata) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Set the table comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// `schema.name`, or the bare name when no schema is set.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, self.name),
            _ => self.name.clone(),
        }
    }

    /// Whether the column takes part in a foreign key, by flag or by FK list.
    pub fn column_is_foreign_key(&self, column: &ColumnMetadata) -> bool {
        column.is_foreign_key
            || self
                .foreign_keys
                .iter()
                .any(|fk| fk.column_name == column.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    /// Type as reported by the engine (e.g., `varchar(30)`, `INTEGER`)
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ColumnMetadata {
    /// Create a new column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            is_primary_key: false,
            is_foreign_key: false,
            default_value: None,
            comment: None,
        }
    }

    /// Mark the column as part of the primary key.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Mark the column as a foreign key.
    pub fn with_foreign_key(mut self, is_fk: bool) -> Self {
        self.is_foreign_key = is_fk;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyMetadata {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_schema: Option<String>,
}

impl ForeignKeyMetadata {
    /// Create a new foreign key.
    pub fn new(
        column_name: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
            referenced_schema: None,
        }
    }

    /// Set the schema of the referenced table.
    pub fn with_referenced_schema(mut self, schema: impl Into<String>) -> Self {
        self.referenced_schema = Some(schema.into());
        self
    }
}
