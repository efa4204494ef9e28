//! Builds [`DatabaseMetadata`] from a live provider.

use crate::db::provider::DatabaseProvider;
use crate::error::ChatResult;
use crate::models::DatabaseMetadata;
use tracing::{info, warn};

/// List the tables of `schema` (or the default schema) and describe each one.
///
/// A table that fails to describe is skipped; listing failures are returned.
pub async fn scan_database(
    provider: &dyn DatabaseProvider,
    schema: Option<&str>,
) -> ChatResult<DatabaseMetadata> {
    let db_type = provider.db_type();
    let schema = schema.or(db_type.default_schema());
    let names = provider.list_tables(schema).await?;

    let mut metadata = DatabaseMetadata::new().with_database_type(db_type.label());
    if let Some(name) = provider.database_name() {
        metadata = metadata.with_database_name(name);
    }

    for name in &names {
        match provider.describe_table(name, schema).await {
            Ok(table) => metadata = metadata.with_table(table),
            Err(e) => warn!(table = %name, error = %e, "Skipping table that failed to describe"),
        }
    }

    info!(
        tables = metadata.tables.len(),
        listed = names.len(),
        schema = schema.unwrap_or("default"),
        "Schema scan complete"
    );
    Ok(metadata)
}
