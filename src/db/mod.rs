//! Database access layer.
//!
//! - Connection pools per engine
//! - Query execution with row caps and timeouts
//! - Schema introspection and scanning
//! - The [`DatabaseProvider`] capability the tools run against

pub mod executor;
pub mod params;
pub mod pool;
pub mod provider;
pub mod scanner;
pub mod schema;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::DbPool;
pub use provider::{DatabaseProvider, SqlProvider};
pub use scanner::scan_database;
pub use schema::SchemaInspector;
