//! SQL safety validation.
//!
//! Every piece of SQL text produced by the model passes through this module
//! before it can reach a database. It classifies statements, collects the
//! tables they touch, decides whether they may run under the current
//! read-only mode, and bounds unbounded SELECTs with a LIMIT.
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) with the generic dialect for
//! classification, plus two textual checks that run on the raw input: a
//! stacked destructive statement pattern and LIMIT detection.
//!
//! None of these functions fail or panic; parse problems are reported inside
//! the returned [`SqlAnalysis`].

use regex::Regex;
use serde::Serialize;
use sqlparser::ast::{Query, SetExpr, Statement, Visit, visit_relations};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::ops::ControlFlow;
use std::sync::LazyLock;

/// A destructive statement stacked after another one.
static STACKED_DESTRUCTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i);\s*(DROP|TRUNCATE|DELETE\s+FROM\s+\w+\s*;?\s*$)")
        .unwrap_or_else(|e| panic!("invalid stacked statement pattern: {e}"))
});

static LIMIT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+\d+").unwrap_or_else(|e| panic!("invalid limit pattern: {e}"))
});

mod messages {
    pub const WRITE_NOT_ALLOWED: &str = "write operations not allowed";
    pub const STACKED: &str = "stacked destructive statement detected";
    pub const MULTIPLE: &str = "multiple statements detected";
    pub const EMPTY: &str = "empty SQL statement";
}

/// Result of analyzing one piece of SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlAnalysis {
    pub is_valid: bool,
    pub is_read_only: bool,
    /// Lowercase statement kind (e.g., "select", "insert"); "unknown" on parse failure
    pub statement_type: String,
    /// Tables in first-seen order, duplicates kept
    pub referenced_tables: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SqlAnalysis {
    fn invalid(error: String) -> Self {
        Self {
            is_valid: false,
            is_read_only: true,
            statement_type: "unknown".to_string(),
            referenced_tables: Vec::new(),
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn is_select(&self) -> bool {
        self.statement_type == "select"
    }
}

/// Verdict of [`validate_safe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafetyCheck {
    pub safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SafetyCheck {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
        }
    }

    fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
        }
    }
}

/// Parse and classify SQL text.
///
/// With several statements, `statement_type` is the last statement's kind,
/// `referenced_tables` accumulates across all of them, and `is_read_only`
/// is false as soon as any statement writes.
pub fn analyze(sql: &str) -> SqlAnalysis {
    let statements = match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => return SqlAnalysis::invalid(e.to_string()),
    };

    if statements.is_empty() {
        return SqlAnalysis::invalid(messages::EMPTY.to_string());
    }

    let mut analysis = SqlAnalysis {
        is_valid: true,
        is_read_only: true,
        statement_type: "unknown".to_string(),
        referenced_tables: Vec::new(),
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    if statements.len() > 1 {
        analysis.warnings.push(messages::MULTIPLE.to_string());
    }

    for stmt in &statements {
        if !is_read_only_statement(stmt) {
            analysis.is_read_only = false;
        }
        collect_tables(stmt, &mut analysis.referenced_tables);
        analysis.statement_type = statement_kind(stmt);
    }

    analysis
}

/// Decide whether SQL text may be executed.
///
/// Unsafe when it does not parse, when it writes while `read_only_mode` is
/// set, or (in any mode) when a DROP, TRUNCATE or trailing DELETE is stacked
/// after another statement.
pub fn validate_safe(sql: &str, read_only_mode: bool) -> SafetyCheck {
    let analysis = analyze(sql);

    if !analysis.is_valid {
        return SafetyCheck::unsafe_because(analysis.errors.join("; "));
    }

    if read_only_mode && !analysis.is_read_only {
        return SafetyCheck::unsafe_because(messages::WRITE_NOT_ALLOWED);
    }

    if STACKED_DESTRUCTIVE.is_match(sql) {
        return SafetyCheck::unsafe_because(messages::STACKED);
    }

    SafetyCheck::safe()
}

/// Append `LIMIT <limit>` to a SELECT that has none.
///
/// Text already containing `LIMIT <n>` anywhere is returned unchanged, as is
/// anything not starting with SELECT. When the last line carries a `--`
/// comment the clause goes on its own line.
pub fn add_limit(sql: &str, limit: u32) -> String {
    let trimmed = sql.trim();

    if LIMIT_CLAUSE.is_match(trimmed) {
        return sql.to_string();
    }

    let starts_with_select = trimmed
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select"));
    if !starts_with_select {
        return sql.to_string();
    }

    let body = trimmed.trim_end_matches(';').trim_end();
    let last_line = body.rsplit('\n').next().unwrap_or(body);
    let separator = if last_line.contains("--") { '\n' } else { ' ' };
    format!("{body}{separator}LIMIT {limit}")
}

/// Reads are an allowlist: anything not recognized here counts as a write.
fn is_read_only_statement(stmt: &Statement) -> bool {
    match stmt {
        Statement::Query(query) => !query_writes(query),
        Statement::Explain { statement, .. } => is_read_only_statement(statement),
        Statement::ExplainTable { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowViews { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowObjects { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ShowCharset { .. } => true,
        _ => false,
    }
}

/// `SELECT ... INTO` or a data-modifying CTE anywhere in the query.
fn query_writes(query: &Query) -> bool {
    let cte_writes = query
        .with
        .as_ref()
        .is_some_and(|with| with.cte_tables.iter().any(|cte| query_writes(&cte.query)));
    cte_writes || set_expr_writes(&query.body)
}

fn set_expr_writes(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_some(),
        SetExpr::Query(query) => query_writes(query),
        SetExpr::SetOperation { left, right, .. } => set_expr_writes(left) || set_expr_writes(right),
        SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Delete(_) | SetExpr::Merge(_) => true,
        SetExpr::Values(_) | SetExpr::Table(_) => false,
    }
}

/// Lowercase kind of a parsed statement.
fn statement_kind(stmt: &Statement) -> String {
    let kind = match stmt {
        Statement::Query(_) => "select",
        Statement::Insert { .. } => "insert",
        Statement::Update { .. } => "update",
        Statement::Delete { .. } => "delete",
        Statement::Merge { .. } => "merge",
        Statement::Copy { .. } | Statement::CopyIntoSnowflake { .. } => "copy",

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateTrigger { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateVirtualTable { .. }
        | Statement::CreateExtension { .. }
        | Statement::CreatePolicy { .. } => "create",

        Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterSchema { .. }
        | Statement::AlterRole { .. }
        | Statement::AlterPolicy { .. }
        | Statement::AlterType { .. } => "alter",

        Statement::Drop { .. }
        | Statement::DropFunction { .. }
        | Statement::DropProcedure { .. }
        | Statement::DropTrigger { .. }
        | Statement::DropPolicy { .. } => "drop",

        Statement::Truncate { .. } => "truncate",
        Statement::Grant { .. } => "grant",
        Statement::Revoke { .. } => "revoke",
        Statement::Call { .. } => "call",

        // EXPLAIN of a write is classified as that write
        Statement::Explain { statement, .. } => {
            return if is_read_only_statement(statement) {
                "explain".to_string()
            } else {
                statement_kind(statement)
            };
        }

        other => return first_keyword(other),
    };
    kind.to_string()
}

fn first_keyword(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Push every table the statement references, in visit order.
fn collect_tables(stmt: &Statement, tables: &mut Vec<String>) {
    match stmt {
        // Target first, then whatever the source reads
        Statement::Insert(insert) => {
            tables.push(insert.table.to_string());
            if let Some(source) = &insert.source {
                push_relations(source.as_ref(), tables);
            }
        }
        _ => push_relations(stmt, tables),
    }
}

fn push_relations<V: Visit>(node: &V, tables: &mut Vec<String>) {
    let _ = visit_relations(node, |relation| {
        tables.push(relation.to_string());
        ControlFlow::<()>::Continue(())
    });
}
