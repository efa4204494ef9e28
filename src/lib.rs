//! Natural-language chat over SQL databases.
//!
//! An LLM answers questions about a database through a small, closed tool
//! catalog (`list_tables`, `describe_table`, `generate_sql`, `explain_sql`,
//! `run_sql`). Every statement passes a parser-based safety gate before it
//! reaches PostgreSQL, MySQL or SQLite.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod semantic;
pub mod tools;

pub use chat::{Orchestrator, SessionStore};
pub use config::Config;
pub use error::{ChatError, ChatResult};
