//! MySQL dialect.

use super::{Capabilities, Dialect};
use crate::expr::BinaryOp;
use crate::tx::IsolationLevel;

const MYSQL_CAPABILITIES: Capabilities = Capabilities {
    window_functions: true,
    common_table_expressions: true,
    recursive_cte: true,
    returning: false,
    advanced_grouping: false,
    filter_clause: false,
    ilike: false,
    intersect_except: false,
    nulls_ordering: false,
};

/// MySQL 8.0 with backtick-quoted identifiers.
#[derive(Debug, Clone)]
pub struct MysqlDialect {
    capabilities: Capabilities,
}

impl MysqlDialect {
    pub fn new() -> Self {
        Self {
            capabilities: MYSQL_CAPABILITIES,
        }
    }
}

impl Default for MysqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    // `||` is logical OR unless PIPES_AS_CONCAT is set.
    fn render_binary(&self, op: BinaryOp, left: &str, right: &str) -> String {
        match op {
            BinaryOp::Concat => format!("CONCAT({left}, {right})"),
            other => format!("{left} {} {right}", other.as_sql()),
        }
    }

    // Backslash escapes inside string literals unless NO_BACKSLASH_ESCAPES is set.
    fn escape_char_literal(&self, escape: char) -> String {
        if escape == '\\' {
            return "'\\\\'".to_string();
        }
        format!("'{escape}'")
    }

    fn render_limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> Option<String> {
        match (limit, offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => Some(format!("LIMIT {limit}")),
            (None, Some(offset)) => Some(format!("LIMIT {} OFFSET {offset}", u64::MAX)),
            (None, None) => None,
        }
    }

    fn begin_sql(&self) -> String {
        "START TRANSACTION".to_string()
    }

    fn isolation_level_sql(&self, level: IsolationLevel) -> Vec<String> {
        vec![format!(
            "SET SESSION TRANSACTION ISOLATION LEVEL {}",
            level.as_sql()
        )]
    }
}
