//! SQLite storage backend.
//!
//! # Responsibility
//! - Own one physical connection and its transaction state.
//! - Compile statements with the connection's dialect and execute them with bound parameters.
//! - Report driver failures as classified `ExecutionError`s with transaction context.
//!
//! # Invariants
//! - A failed statement never changes transaction state or depth, unless SQLite
//!   ended the transaction itself; the manager then falls back to `RolledBack` at 0.
//! - Parameter values are never written to logs.

use crate::compile::{compile, CompiledQuery};
use crate::config::BackendConfig;
use crate::db::{open_db, open_db_in_memory};
use crate::dialect::{Dialect, DialectKind};
use crate::query::Statement;
use crate::tx::{IsolationLevel, TransactionConnection, TransactionManager, TransactionState};
use crate::value::Value;
use log::{debug, error, warn};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

mod error;

pub use error::{BackendError, BackendResult, ExecutionError, ExecutionErrorKind};

impl TransactionConnection for Connection {
    fn execute_control(&mut self, sql: &str) -> Result<(), ExecutionError> {
        self.execute_batch(sql).map_err(ExecutionError::from)
    }

    fn transaction_open(&self) -> Option<bool> {
        Some(!self.is_autocommit())
    }
}

/// One result row; column names are shared by every row of a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the first column named `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|column| column == name)
            .and_then(|index| self.values.get(index))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecuteResult {
    pub affected_rows: u64,
    /// Row id of the last inserted row, for INSERT statements that changed rows.
    pub last_insert_id: Option<Value>,
    pub rows: Vec<Row>,
}

#[derive(Debug)]
pub struct SqliteBackend {
    conn: Connection,
    dialect: Arc<dyn Dialect>,
    transactions: TransactionManager,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>, config: &BackendConfig) -> BackendResult<Self> {
        ensure_sqlite(config)?;
        let conn = open_db(path, config)?;
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory(config: &BackendConfig) -> BackendResult<Self> {
        ensure_sqlite(config)?;
        let conn = open_db_in_memory(config)?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: &BackendConfig) -> BackendResult<Self> {
        let dialect = config.dialect.dialect();
        let transactions = TransactionManager::new(Arc::clone(&dialect))
            .with_savepoint_prefix(config.savepoint_prefix.clone())?;
        let mut backend = Self {
            conn,
            dialect,
            transactions,
        };
        if let Some(level) = config.isolation_level {
            backend.set_isolation_level(level)?;
        }
        Ok(backend)
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn compile(&self, statement: &Statement) -> BackendResult<CompiledQuery> {
        Ok(compile(statement, self.dialect.as_ref())?)
    }

    /// Runs `sql` with positional `params` and collects every result row.
    ///
    /// On failure the error carries the transaction depth and state as they stand
    /// afterwards, so a transaction SQLite rolled back reports depth 0.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> BackendResult<ExecuteResult> {
        let started_at = Instant::now();
        match self.run(sql, params) {
            Ok(result) => {
                debug!(
                    "event=stmt_execute module=backend status=ok sql_len={} param_count={} affected_rows={} row_count={} duration_ms={}",
                    sql.len(),
                    params.len(),
                    result.affected_rows,
                    result.rows.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(err) => {
                let source = ExecutionError::from(err);
                if self.transactions.resync(&self.conn) {
                    warn!(
                        "event=stmt_execute module=backend status=tx_aborted sql_len={} error_code={}",
                        sql.len(),
                        source.kind().as_str()
                    );
                }
                error!(
                    "event=stmt_execute module=backend status=error sql_len={} param_count={} depth={} duration_ms={} error_code={} error={}",
                    sql.len(),
                    params.len(),
                    self.transactions.depth(),
                    started_at.elapsed().as_millis(),
                    source.kind().as_str(),
                    source.message()
                );
                Err(BackendError::Execution {
                    source,
                    depth: self.transactions.depth(),
                    state: self.transactions.state(),
                })
            }
        }
    }

    pub fn execute_compiled(&mut self, compiled: &CompiledQuery) -> BackendResult<ExecuteResult> {
        self.execute(&compiled.sql, &compiled.params)
    }

    pub fn execute_statement(&mut self, statement: &Statement) -> BackendResult<ExecuteResult> {
        let compiled = self.compile(statement)?;
        self.execute_compiled(&compiled)
    }

    /// Compiles and runs `statement`, returning only its rows.
    pub fn query(&mut self, statement: &Statement) -> BackendResult<Vec<Row>> {
        Ok(self.execute_statement(statement)?.rows)
    }

    fn run(&self, sql: &str, params: &[Value]) -> rusqlite::Result<ExecuteResult> {
        let mut stmt = self.conn.prepare(sql)?;

        if stmt.column_count() == 0 {
            let changed = stmt.execute(params_from_iter(params.iter()))?;
            return Ok(ExecuteResult {
                affected_rows: changed as u64,
                last_insert_id: self.last_insert_id(sql, changed),
                rows: Vec::new(),
            });
        }

        let readonly = stmt.readonly();
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            let values = (0..columns.len())
                .map(|index| row.get_ref(index).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.push(Row {
                columns: Arc::clone(&columns),
                values,
            });
        }

        // Writes that return rows (RETURNING) yield one row per changed row.
        let changed = if readonly { 0 } else { rows.len() };
        Ok(ExecuteResult {
            affected_rows: changed as u64,
            last_insert_id: self.last_insert_id(sql, changed),
            rows,
        })
    }

    fn last_insert_id(&self, sql: &str, changed: usize) -> Option<Value> {
        if changed == 0 || !is_insert_sql(sql) {
            return None;
        }
        Some(Value::Integer(self.conn.last_insert_rowid()))
    }

    pub fn begin(&mut self) -> BackendResult<usize> {
        Ok(self.transactions.begin(&mut self.conn)?)
    }

    pub fn commit(&mut self) -> BackendResult<()> {
        Ok(self.transactions.commit(&mut self.conn)?)
    }

    pub fn rollback(&mut self) -> BackendResult<()> {
        Ok(self.transactions.rollback(&mut self.conn)?)
    }

    pub fn savepoint(&mut self, name: Option<&str>) -> BackendResult<String> {
        Ok(self.transactions.savepoint(&mut self.conn, name)?)
    }

    pub fn release(&mut self, name: &str) -> BackendResult<()> {
        Ok(self.transactions.release(&mut self.conn, name)?)
    }

    pub fn rollback_to(&mut self, name: &str) -> BackendResult<()> {
        Ok(self.transactions.rollback_to(&mut self.conn, name)?)
    }

    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> BackendResult<()> {
        Ok(self.transactions.set_isolation_level(&mut self.conn, level)?)
    }

    /// Resyncs transaction state with the connection; true when SQLite had
    /// already ended the transaction and the manager was reset.
    pub fn resync_transactions(&mut self) -> bool {
        self.transactions.resync(&self.conn)
    }

    pub fn depth(&self) -> usize {
        self.transactions.depth()
    }

    pub fn state(&self) -> TransactionState {
        self.transactions.state()
    }

    /// Runs `work` inside one transaction level.
    ///
    /// The level is committed when `work` succeeds and rolled back when it fails;
    /// the error from `work` is returned unchanged.
    pub fn with_transaction<T, F>(&mut self, work: F) -> BackendResult<T>
    where
        F: FnOnce(&mut Self) -> BackendResult<T>,
    {
        self.begin()?;
        match work(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    error!(
                        "event=tx_rollback module=backend status=error depth={} error={}",
                        self.depth(),
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}

fn ensure_sqlite(config: &BackendConfig) -> BackendResult<()> {
    if config.dialect == DialectKind::Sqlite {
        return Ok(());
    }
    Err(BackendError::UnsupportedDialect(config.dialect.as_str()))
}

fn is_insert_sql(sql: &str) -> bool {
    let head = sql.trim_start();
    head.len() >= 6
        && head.is_char_boundary(6)
        && head[..6].eq_ignore_ascii_case("insert")
}
