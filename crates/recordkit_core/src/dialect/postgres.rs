//! PostgreSQL dialect.

use super::{Capabilities, Dialect};

/// PostgreSQL with numbered `$n` placeholders.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    capabilities: Capabilities,
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::all(),
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }
}

#[cfg(test)]
mod tests {
    use super::PostgresDialect;
    use crate::dialect::Dialect;

    #[test]
    fn placeholders_are_numbered() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.placeholder(1), "$1");
        assert_eq!(dialect.placeholder(12), "$12");
    }
}
