//! SQLite dialect.

use super::{Capabilities, Dialect};
use crate::tx::IsolationLevel;

const SQLITE_CAPABILITIES: Capabilities = Capabilities {
    window_functions: true,
    common_table_expressions: true,
    recursive_cte: true,
    returning: true,
    advanced_grouping: false,
    filter_clause: true,
    ilike: false,
    intersect_except: true,
    nulls_ordering: true,
};

/// SQLite 3.35+ (window functions, `RETURNING`, `FILTER`, `NULLS FIRST/LAST`).
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    capabilities: Capabilities,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            capabilities: SQLITE_CAPABILITIES,
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    // SQLite only accepts OFFSET after a LIMIT; -1 means "no limit".
    fn render_limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> Option<String> {
        match (limit, offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => Some(format!("LIMIT {limit}")),
            (None, Some(offset)) => Some(format!("LIMIT -1 OFFSET {offset}")),
            (None, None) => None,
        }
    }

    // Transactions are always SERIALIZABLE except that shared-cache readers may
    // opt into dirty reads.
    fn isolation_level_sql(&self, level: IsolationLevel) -> Vec<String> {
        let read_uncommitted = matches!(level, IsolationLevel::ReadUncommitted);
        vec![format!(
            "PRAGMA read_uncommitted = {}",
            i32::from(read_uncommitted)
        )]
    }
}
