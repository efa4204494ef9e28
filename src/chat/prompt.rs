//! System prompt assembly.

use crate::models::DatabaseMetadata;
use crate::semantic;
use crate::tools::ToolDefinition;
use std::fmt::Write as _;

const GUIDELINES: &[&str] = &[
    "Inspect the schema with list_tables or describe_table when the context above is not enough.",
    "Validate SQL with explain_sql before executing it with run_sql.",
    "Only statements that read data run while read-only mode is on; do not attempt writes unless the user asks and the mode allows it.",
    "Prefer the structured JSON response format below whenever the answer contains data.",
    "Warn the user when a query is likely to return a large result, and add a LIMIT.",
    "If a tool returns an error, correct the SQL or explain the problem instead of repeating the same call.",
];

/// Build the system message for a conversation.
pub fn build_system_prompt(metadata: Option<&DatabaseMetadata>, tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You are a database assistant. You answer questions about a relational database \
         by calling the tools below and summarizing what they return.\n",
    );

    prompt.push_str("\n## Database Schema\n");
    match metadata.filter(|m| !m.is_empty()) {
        Some(metadata) => {
            if let Some(db_type) = &metadata.database_type {
                let _ = writeln!(prompt, "Engine: {}", db_type);
            }
            prompt.push_str(&semantic::generate_compact_schema(metadata));
            prompt.push('\n');
        }
        None => prompt.push_str("No schema loaded. Use list_tables and describe_table to explore.\n"),
    }

    prompt.push_str("\n## Available Tools\n");
    for tool in tools {
        let _ = writeln!(prompt, "- {}: {}", tool.name, tool.description);
    }

    prompt.push_str("\n## Guidelines\n");
    for (i, guideline) in GUIDELINES.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, guideline);
    }

    prompt.push_str(
        "\n## Response Format\n\
         When you have the final answer, reply with a single JSON object:\n\
         {\"response_type\": \"text\" | \"table\" | \"chart\", \"description\": \"<answer for the user>\", \
         \"data\": <rows or chart series, optional>, \"sql\": \"<SQL you ran, optional>\"}\n\
         Plain text is accepted for answers without data.\n",
    );

    prompt
}
