//! SQL dialects: capability declarations and per-node rendering.
//!
//! # Responsibility
//! - Declare which optional SQL features a dialect supports (`Capabilities`).
//! - Render already-compiled child fragments into dialect-correct SQL text.
//! - Own identifier quoting, placeholder style and transaction-control SQL.
//!
//! # Invariants
//! - A dialect only advertises a feature whose rendering method is correct for it.
//! - Capabilities are immutable after construction and safe to share across threads.
//! - Rendering methods never see user values; those arrive as placeholders.

use crate::expr::{BinaryOp, Frame, LogicalOp};
use crate::tx::IsolationLevel;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Optional SQL feature that a dialect may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    WindowFunctions,
    CommonTableExpressions,
    RecursiveCte,
    Returning,
    AdvancedGrouping,
    FilterClause,
    Ilike,
    IntersectExcept,
    NullsOrdering,
}

impl Feature {
    /// Stable feature name used in errors and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WindowFunctions => "window_functions",
            Self::CommonTableExpressions => "common_table_expressions",
            Self::RecursiveCte => "recursive_cte",
            Self::Returning => "returning",
            Self::AdvancedGrouping => "advanced_grouping",
            Self::FilterClause => "filter_clause",
            Self::Ilike => "ilike",
            Self::IntersectExcept => "intersect_except",
            Self::NullsOrdering => "nulls_ordering",
        }
    }

    pub fn all() -> &'static [Feature] {
        &[
            Self::WindowFunctions,
            Self::CommonTableExpressions,
            Self::RecursiveCte,
            Self::Returning,
            Self::AdvancedGrouping,
            Self::FilterClause,
            Self::Ilike,
            Self::IntersectExcept,
            Self::NullsOrdering,
        ]
    }
}

/// Feature support declared by one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub window_functions: bool,
    pub common_table_expressions: bool,
    pub recursive_cte: bool,
    pub returning: bool,
    pub advanced_grouping: bool,
    pub filter_clause: bool,
    pub ilike: bool,
    pub intersect_except: bool,
    pub nulls_ordering: bool,
}

impl Capabilities {
    /// Every optional feature supported.
    pub const fn all() -> Self {
        Self {
            window_functions: true,
            common_table_expressions: true,
            recursive_cte: true,
            returning: true,
            advanced_grouping: true,
            filter_clause: true,
            ilike: true,
            intersect_except: true,
            nulls_ordering: true,
        }
    }

    /// No optional feature supported.
    pub const fn none() -> Self {
        Self {
            window_functions: false,
            common_table_expressions: false,
            recursive_cte: false,
            returning: false,
            advanced_grouping: false,
            filter_clause: false,
            ilike: false,
            intersect_except: false,
            nulls_ordering: false,
        }
    }

    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::WindowFunctions => self.window_functions,
            Feature::CommonTableExpressions => self.common_table_expressions,
            Feature::RecursiveCte => self.recursive_cte,
            Feature::Returning => self.returning,
            Feature::AdvancedGrouping => self.advanced_grouping,
            Feature::FilterClause => self.filter_clause,
            Feature::Ilike => self.ilike,
            Feature::IntersectExcept => self.intersect_except,
            Feature::NullsOrdering => self.nulls_ordering,
        }
    }
}

/// Dialect compiler seam.
///
/// Provided methods render ANSI SQL; concrete dialects override the pieces
/// that differ. Child fragments passed in are already compiled and already
/// parenthesized where precedence requires it.
pub trait Dialect: Debug + Send + Sync {
    /// Short dialect id, e.g. `sqlite`.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &Capabilities;

    fn supports(&self, feature: Feature) -> bool {
        self.capabilities().supports(feature)
    }

    /// Quotes one identifier, doubling embedded quote characters.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Placeholder for the parameter at 1-based `index`.
    fn placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    fn render_column(&self, table: Option<&str>, name: &str) -> String {
        match table {
            Some(table) => format!(
                "{}.{}",
                self.quote_identifier(table),
                self.quote_identifier(name)
            ),
            None => self.quote_identifier(name),
        }
    }

    fn render_function(&self, name: &str, args: &[String]) -> String {
        format!("{name}({})", args.join(", "))
    }

    fn render_aggregate(
        &self,
        name: &str,
        args: &[String],
        distinct: bool,
        filter: Option<&str>,
    ) -> String {
        let distinct = if distinct { "DISTINCT " } else { "" };
        let mut sql = format!("{name}({distinct}{})", args.join(", "));
        if let Some(filter) = filter {
            sql.push_str(&format!(" FILTER (WHERE {filter})"));
        }
        sql
    }

    fn render_binary(&self, op: BinaryOp, left: &str, right: &str) -> String {
        format!("{left} {} {right}", op.as_sql())
    }

    fn render_logical(&self, op: LogicalOp, operands: &[String]) -> String {
        match op {
            LogicalOp::Not => format!("NOT ({})", operands.join(" ")),
            LogicalOp::And | LogicalOp::Or => operands.join(&format!(" {} ", op.as_sql())),
        }
    }

    fn render_like(
        &self,
        expr: &str,
        pattern: &str,
        negated: bool,
        case_insensitive: bool,
        escape: Option<char>,
    ) -> String {
        let not = if negated { "NOT " } else { "" };
        let keyword = if case_insensitive { "ILIKE" } else { "LIKE" };
        let mut sql = format!("{expr} {not}{keyword} {pattern}");
        if let Some(escape) = escape {
            sql.push_str(&format!(" ESCAPE {}", self.escape_char_literal(escape)));
        }
        sql
    }

    /// String literal holding a LIKE escape character.
    fn escape_char_literal(&self, escape: char) -> String {
        format!("'{escape}'")
    }

    /// `items` is the comma-joined candidate list or a compiled subquery.
    fn render_in(&self, expr: &str, items: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        format!("{expr} {not}IN ({items})")
    }

    fn render_between(&self, expr: &str, low: &str, high: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        format!("{expr} {not}BETWEEN {low} AND {high}")
    }

    fn render_is_null(&self, expr: &str, negated: bool) -> String {
        if negated {
            format!("{expr} IS NOT NULL")
        } else {
            format!("{expr} IS NULL")
        }
    }

    fn render_window(
        &self,
        function: &str,
        partition_by: &[String],
        order_by: &[String],
        frame: Option<&Frame>,
    ) -> String {
        let mut clauses = Vec::new();
        if !partition_by.is_empty() {
            clauses.push(format!("PARTITION BY {}", partition_by.join(", ")));
        }
        if !order_by.is_empty() {
            clauses.push(format!("ORDER BY {}", order_by.join(", ")));
        }
        if let Some(frame) = frame {
            clauses.push(format!(
                "{} BETWEEN {} AND {}",
                frame.kind.as_sql(),
                frame.start.to_sql(),
                frame.end.to_sql()
            ));
        }
        format!("{function} OVER ({})", clauses.join(" "))
    }

    fn render_case(
        &self,
        operand: Option<&str>,
        branches: &[(String, String)],
        else_result: Option<&str>,
    ) -> String {
        let mut sql = String::from("CASE");
        if let Some(operand) = operand {
            sql.push(' ');
            sql.push_str(operand);
        }
        for (condition, result) in branches {
            sql.push_str(&format!(" WHEN {condition} THEN {result}"));
        }
        if let Some(else_result) = else_result {
            sql.push_str(&format!(" ELSE {else_result}"));
        }
        sql.push_str(" END");
        sql
    }

    /// Trailing `LIMIT`/`OFFSET` text from already-allocated placeholders.
    fn render_limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> Option<String> {
        match (limit, offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => Some(format!("LIMIT {limit}")),
            (None, Some(offset)) => Some(format!("OFFSET {offset}")),
            (None, None) => None,
        }
    }

    fn begin_sql(&self) -> String {
        "BEGIN".to_string()
    }

    fn commit_sql(&self) -> String {
        "COMMIT".to_string()
    }

    fn rollback_sql(&self) -> String {
        "ROLLBACK".to_string()
    }

    fn savepoint_sql(&self, name: &str) -> String {
        format!("SAVEPOINT {}", self.quote_identifier(name))
    }

    fn release_savepoint_sql(&self, name: &str) -> String {
        format!("RELEASE SAVEPOINT {}", self.quote_identifier(name))
    }

    fn rollback_to_savepoint_sql(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.quote_identifier(name))
    }

    /// Session statements that put `level` into effect for later transactions.
    fn isolation_level_sql(&self, level: IsolationLevel) -> Vec<String> {
        vec![format!(
            "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        )]
    }
}

/// ANSI SQL with every optional feature enabled and `?` placeholders.
#[derive(Debug, Clone)]
pub struct StandardDialect {
    capabilities: Capabilities,
}

impl StandardDialect {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::all(),
        }
    }

    /// Standard rendering with a caller-chosen capability set.
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

impl Default for StandardDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for StandardDialect {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

/// Built-in dialect selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    Standard,
    Sqlite,
    Postgres,
    Mysql,
}

impl DialectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
        }
    }

    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            Self::Standard => Arc::new(StandardDialect::new()),
            Self::Sqlite => Arc::new(SqliteDialect::new()),
            Self::Postgres => Arc::new(PostgresDialect::new()),
            Self::Mysql => Arc::new(MysqlDialect::new()),
        }
    }
}
