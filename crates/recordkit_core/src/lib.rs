//! Record storage core: SQL expression trees, per-dialect compilation and
//! connection-scoped transactions over SQLite.
//!
//! Expressions and queries are built with fallible constructors, compiled
//! against a `Dialect` into SQL text plus positional parameters, and executed
//! by `SqliteBackend` under a `TransactionManager`.

pub mod backend;
pub mod compile;
pub mod config;
pub mod db;
pub mod dialect;
pub mod expr;
pub mod logging;
pub mod query;
pub mod tx;
pub mod value;

pub use backend::{
    BackendError, BackendResult, ExecuteResult, ExecutionError, ExecutionErrorKind, Row,
    SqliteBackend,
};
pub use compile::{compile, CompileError, CompileResult, CompiledQuery};
pub use config::{BackendConfig, ConfigError};
pub use dialect::{
    Capabilities, Dialect, DialectKind, Feature, MysqlDialect, PostgresDialect, SqliteDialect,
    StandardDialect,
};
pub use expr::{ConstructionError, ConstructionResult, Expr};
pub use logging::{default_log_level, init_logging, logging_status};
pub use query::{Delete, Insert, Query, Statement, TableRef, Update};
pub use tx::{
    IsolationLevel, IsolationLevelError, TransactionError, TransactionManager, TransactionState,
};
pub use value::Value;

/// Minimal health-check API for integration probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
