//! Connection-scoped transaction state machine.
//!
//! # Responsibility
//! - Map the first `begin` to a physical transaction and nested ones to savepoints.
//! - Apply isolation levels only while no transaction is open.
//! - Attach depth and operation context to connection failures.
//!
//! # Invariants
//! - While `Active`: `savepoints.len() == depth - 1`.
//! - Depth moves by one per begin/commit/rollback; `release`/`rollback_to` drop the
//!   named level and every level opened after it.
//! - A failed control statement leaves state, depth and the stack unchanged, unless
//!   the connection reports that the database ended the transaction itself.
//! - Once the database has ended the transaction, the manager falls back to
//!   `RolledBack` at depth 0 before any further control statement is issued.
//! - One manager per connection; it is not meant to be shared across threads.

use crate::backend::ExecutionError;
use crate::dialect::Dialect;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static SAVEPOINT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid savepoint name regex"));

/// Default prefix for generated savepoint names (`sp1`, `sp2`, ...).
pub const DEFAULT_SAVEPOINT_PREFIX: &str = "sp";

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Whether `name` is usable as a savepoint name or name prefix.
pub fn is_valid_savepoint_name(name: &str) -> bool {
    SAVEPOINT_NAME_RE.is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    pub fn all() -> [IsolationLevel; 4] {
        [
            Self::ReadUncommitted,
            Self::ReadCommitted,
            Self::RepeatableRead,
            Self::Serializable,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Inactive,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Isolation level change requested while a transaction is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationLevelError {
    pub requested: IsolationLevel,
    pub depth: usize,
}

impl Display for IsolationLevelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot set isolation level {} inside an active transaction (depth {})",
            self.requested.as_sql(),
            self.depth
        )
    }
}

impl Error for IsolationLevelError {}

#[derive(Debug)]
pub enum TransactionError {
    NoActiveTransaction {
        operation: &'static str,
    },
    UnknownSavepoint {
        name: String,
        depth: usize,
    },
    DuplicateSavepoint {
        name: String,
    },
    InvalidSavepointName(String),
    IsolationLevel(IsolationLevelError),
    /// The database ended the transaction on its own (for example `INSERT OR ROLLBACK`
    /// or `RAISE(ROLLBACK)`); `depth` is the level that was lost.
    Aborted {
        operation: &'static str,
        depth: usize,
    },
    /// The connection rejected a control statement.
    Execution {
        operation: &'static str,
        depth: usize,
        source: ExecutionError,
    },
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoActiveTransaction { operation } => {
                write!(f, "no active transaction for {operation}")
            }
            Self::UnknownSavepoint { name, depth } => {
                write!(f, "savepoint `{name}` not found (depth {depth})")
            }
            Self::DuplicateSavepoint { name } => {
                write!(f, "savepoint `{name}` is already open")
            }
            Self::InvalidSavepointName(name) => write!(f, "invalid savepoint name `{name}`"),
            Self::IsolationLevel(err) => write!(f, "{err}"),
            Self::Aborted { operation, depth } => write!(
                f,
                "transaction was rolled back by the database before {operation} (lost depth {depth})"
            ),
            Self::Execution {
                operation,
                depth,
                source,
            } => write!(f, "{operation} failed at depth {depth}: {source}"),
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IsolationLevel(err) => Some(err),
            Self::Execution { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<IsolationLevelError> for TransactionError {
    fn from(value: IsolationLevelError) -> Self {
        Self::IsolationLevel(value)
    }
}

/// Physical connection seam used for transaction-control statements.
pub trait TransactionConnection {
    fn execute_control(&mut self, sql: &str) -> Result<(), ExecutionError>;

    /// Whether the connection itself still has a transaction open; `None` when unknown.
    fn transaction_open(&self) -> Option<bool> {
        None
    }
}

/// Nesting, savepoint and isolation state for one connection.
#[derive(Debug)]
pub struct TransactionManager {
    dialect: Arc<dyn Dialect>,
    state: TransactionState,
    depth: usize,
    savepoints: Vec<String>,
    isolation_level: Option<IsolationLevel>,
    savepoint_prefix: String,
    next_savepoint: u64,
}

impl TransactionManager {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            state: TransactionState::Inactive,
            depth: 0,
            savepoints: Vec::new(),
            isolation_level: None,
            savepoint_prefix: DEFAULT_SAVEPOINT_PREFIX.to_string(),
            next_savepoint: 0,
        }
    }

    /// Uses `prefix` for generated savepoint names.
    pub fn with_savepoint_prefix(mut self, prefix: impl Into<String>) -> TransactionResult<Self> {
        let prefix = prefix.into();
        if !is_valid_savepoint_name(&prefix) {
            return Err(TransactionError::InvalidSavepointName(prefix));
        }
        self.savepoint_prefix = prefix;
        Ok(self)
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Open savepoints, oldest first.
    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// Opens a physical transaction, or a savepoint when one is already open.
    ///
    /// Returns the new depth.
    pub fn begin<C>(&mut self, conn: &mut C) -> TransactionResult<usize>
    where
        C: TransactionConnection + ?Sized,
    {
        self.ensure_live(conn, "begin")?;
        if self.is_active() {
            self.push_savepoint(conn, None)?;
            return Ok(self.depth);
        }

        let sql = self.dialect.begin_sql();
        conn.execute_control(&sql)
            .map_err(|source| self.control_failed(conn, "begin", source))?;

        self.state = TransactionState::Active;
        self.depth = 1;
        self.savepoints.clear();
        self.next_savepoint = 0;
        info!("event=tx_begin module=tx status=ok depth=1");
        Ok(self.depth)
    }

    /// Opens a nested level with an explicit or generated savepoint name.
    pub fn savepoint<C>(&mut self, conn: &mut C, name: Option<&str>) -> TransactionResult<String>
    where
        C: TransactionConnection + ?Sized,
    {
        self.ensure_live(conn, "savepoint")?;
        self.ensure_active("savepoint")?;
        self.push_savepoint(conn, name)
    }

    /// Closes the innermost level, committing the physical transaction at depth 1.
    pub fn commit<C>(&mut self, conn: &mut C) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        self.ensure_live(conn, "commit")?;
        self.ensure_active("commit")?;
        if let Some(name) = self.savepoints.last().cloned() {
            return self.release_named(conn, &name, "commit");
        }

        let sql = self.dialect.commit_sql();
        conn.execute_control(&sql)
            .map_err(|source| self.control_failed(conn, "commit", source))?;

        self.depth = 0;
        self.state = TransactionState::Committed;
        info!("event=tx_commit module=tx status=ok depth=0");
        Ok(())
    }

    /// Undoes the innermost level, rolling back the physical transaction at depth 1.
    pub fn rollback<C>(&mut self, conn: &mut C) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        self.ensure_live(conn, "rollback")?;
        self.ensure_active("rollback")?;
        if let Some(name) = self.savepoints.last().cloned() {
            return self.rollback_to_named(conn, &name, "rollback");
        }

        let sql = self.dialect.rollback_sql();
        conn.execute_control(&sql)
            .map_err(|source| self.control_failed(conn, "rollback", source))?;

        self.depth = 0;
        self.state = TransactionState::RolledBack;
        info!("event=tx_rollback module=tx status=ok depth=0");
        Ok(())
    }

    /// Releases `name` and every savepoint opened after it, keeping their work.
    pub fn release<C>(&mut self, conn: &mut C, name: &str) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        self.ensure_live(conn, "release")?;
        self.ensure_active("release")?;
        self.release_named(conn, name, "release")
    }

    /// Undoes work since `name` and drops it plus every savepoint opened after it.
    pub fn rollback_to<C>(&mut self, conn: &mut C, name: &str) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        self.ensure_live(conn, "rollback_to")?;
        self.ensure_active("rollback_to")?;
        self.rollback_to_named(conn, name, "rollback_to")
    }

    /// Applies `level` to the connection for subsequent transactions.
    pub fn set_isolation_level<C>(
        &mut self,
        conn: &mut C,
        level: IsolationLevel,
    ) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        self.resync(conn);
        if self.depth > 0 {
            error!(
                "event=isolation_set module=tx status=error depth={} error_code=transaction_active",
                self.depth
            );
            return Err(IsolationLevelError {
                requested: level,
                depth: self.depth,
            }
            .into());
        }

        for sql in self.dialect.isolation_level_sql(level) {
            conn.execute_control(&sql)
                .map_err(|source| self.control_failed(conn, "set_isolation_level", source))?;
        }

        self.isolation_level = Some(level);
        info!(
            "event=isolation_set module=tx status=ok level={}",
            level.as_sql()
        );
        Ok(())
    }

    /// Falls back to `RolledBack` at depth 0 when the connection reports that the
    /// database already ended the transaction. Returns whether anything was reset.
    pub fn resync<C>(&mut self, conn: &C) -> bool
    where
        C: TransactionConnection + ?Sized,
    {
        if !self.is_active() || conn.transaction_open() != Some(false) {
            return false;
        }
        warn!(
            "event=tx_aborted module=tx status=reset depth={} savepoints={}",
            self.depth,
            self.savepoints.len()
        );
        self.state = TransactionState::RolledBack;
        self.depth = 0;
        self.savepoints.clear();
        true
    }

    fn ensure_live<C>(&mut self, conn: &C, operation: &'static str) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        let depth = self.depth;
        if self.resync(conn) {
            return Err(TransactionError::Aborted { operation, depth });
        }
        Ok(())
    }

    fn ensure_active(&self, operation: &'static str) -> TransactionResult<()> {
        if self.is_active() {
            return Ok(());
        }
        Err(TransactionError::NoActiveTransaction { operation })
    }

    /// Builds the error for a rejected control statement, then resyncs with `conn`.
    fn control_failed<C>(
        &mut self,
        conn: &C,
        operation: &'static str,
        source: ExecutionError,
    ) -> TransactionError
    where
        C: TransactionConnection + ?Sized,
    {
        error!(
            "event=tx_{} module=tx status=error depth={} error_kind={}",
            operation,
            self.depth,
            source.kind().as_str()
        );
        let depth = self.depth;
        self.resync(conn);
        TransactionError::Execution {
            operation,
            depth,
            source,
        }
    }

    fn push_savepoint<C>(&mut self, conn: &mut C, name: Option<&str>) -> TransactionResult<String>
    where
        C: TransactionConnection + ?Sized,
    {
        let name = match name {
            Some(name) => {
                if !is_valid_savepoint_name(name) {
                    return Err(TransactionError::InvalidSavepointName(name.to_string()));
                }
                if self.savepoints.iter().any(|open| open == name) {
                    return Err(TransactionError::DuplicateSavepoint {
                        name: name.to_string(),
                    });
                }
                name.to_string()
            }
            None => self.generate_savepoint_name(),
        };

        let sql = self.dialect.savepoint_sql(&name);
        conn.execute_control(&sql)
            .map_err(|source| self.control_failed(conn, "savepoint", source))?;

        self.savepoints.push(name.clone());
        self.depth += 1;
        debug!(
            "event=savepoint_create module=tx status=ok name={} depth={}",
            name, self.depth
        );
        Ok(name)
    }

    fn generate_savepoint_name(&mut self) -> String {
        loop {
            self.next_savepoint += 1;
            let candidate = format!("{}{}", self.savepoint_prefix, self.next_savepoint);
            if !self.savepoints.contains(&candidate) {
                return candidate;
            }
        }
    }

    fn position_of(&self, name: &str) -> TransactionResult<usize> {
        self.savepoints
            .iter()
            .rposition(|open| open == name)
            .ok_or_else(|| TransactionError::UnknownSavepoint {
                name: name.to_string(),
                depth: self.depth,
            })
    }

    fn release_named<C>(
        &mut self,
        conn: &mut C,
        name: &str,
        operation: &'static str,
    ) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        let position = self.position_of(name)?;
        let sql = self.dialect.release_savepoint_sql(name);
        conn.execute_control(&sql)
            .map_err(|source| self.control_failed(conn, operation, source))?;

        self.pop_from(position);
        debug!(
            "event=savepoint_release module=tx status=ok name={} depth={}",
            name, self.depth
        );
        Ok(())
    }

    fn rollback_to_named<C>(
        &mut self,
        conn: &mut C,
        name: &str,
        operation: &'static str,
    ) -> TransactionResult<()>
    where
        C: TransactionConnection + ?Sized,
    {
        let position = self.position_of(name)?;
        // ROLLBACK TO keeps the savepoint open; RELEASE removes it.
        for sql in [
            self.dialect.rollback_to_savepoint_sql(name),
            self.dialect.release_savepoint_sql(name),
        ] {
            conn.execute_control(&sql)
                .map_err(|source| self.control_failed(conn, operation, source))?;
        }

        self.pop_from(position);
        debug!(
            "event=savepoint_rollback module=tx status=ok name={} depth={}",
            name, self.depth
        );
        Ok(())
    }

    fn pop_from(&mut self, position: usize) {
        let popped = self.savepoints.len() - position;
        self.savepoints.truncate(position);
        self.depth -= popped;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        IsolationLevel, TransactionConnection, TransactionError, TransactionManager,
        TransactionState,
    };
    use crate::backend::{ExecutionError, ExecutionErrorKind};
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingConnection {
        statements: Vec<String>,
        fail_prefix: Option<&'static str>,
        open: Option<bool>,
        close_on_failure: bool,
    }

    impl TransactionConnection for RecordingConnection {
        fn execute_control(&mut self, sql: &str) -> Result<(), ExecutionError> {
            if let Some(prefix) = self.fail_prefix {
                if sql.starts_with(prefix) {
                    if self.close_on_failure {
                        self.open = Some(false);
                    }
                    return Err(ExecutionError::new(
                        ExecutionErrorKind::LockTimeout,
                        "database is locked",
                    ));
                }
            }
            self.statements.push(sql.to_string());
            Ok(())
        }

        fn transaction_open(&self) -> Option<bool> {
            self.open
        }
    }

    fn manager() -> TransactionManager {
        TransactionManager::new(Arc::new(SqliteDialect::new()))
    }

    #[test]
    fn nested_begin_maps_to_savepoints() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();

        assert_eq!(tx.begin(&mut conn).unwrap(), 1);
        assert_eq!(tx.begin(&mut conn).unwrap(), 2);
        assert_eq!(tx.begin(&mut conn).unwrap(), 3);
        assert_eq!(tx.savepoints(), ["sp1".to_string(), "sp2".to_string()]);

        tx.commit(&mut conn).unwrap();
        assert_eq!(tx.depth(), 2);
        tx.rollback(&mut conn).unwrap();
        assert_eq!(tx.depth(), 1);
        assert_eq!(tx.state(), TransactionState::Active);
        tx.commit(&mut conn).unwrap();

        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(tx.depth(), 0);
        assert_eq!(
            conn.statements,
            vec![
                "BEGIN",
                "SAVEPOINT \"sp1\"",
                "SAVEPOINT \"sp2\"",
                "RELEASE SAVEPOINT \"sp2\"",
                "ROLLBACK TO SAVEPOINT \"sp1\"",
                "RELEASE SAVEPOINT \"sp1\"",
                "COMMIT",
            ]
        );
    }

    #[test]
    fn rollback_at_depth_one_ends_transaction() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();
        tx.rollback(&mut conn).unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(tx.depth(), 0);

        // A finished transaction does not block a new one.
        tx.begin(&mut conn).unwrap();
        assert_eq!(tx.state(), TransactionState::Active);
    }

    #[test]
    fn operations_without_active_transaction_fail() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();

        for result in [
            tx.commit(&mut conn),
            tx.rollback(&mut conn),
            tx.release(&mut conn, "sp1"),
            tx.rollback_to(&mut conn, "sp1"),
        ] {
            assert!(matches!(
                result,
                Err(TransactionError::NoActiveTransaction { .. })
            ));
        }
        assert!(tx.savepoint(&mut conn, None).is_err());

        tx.begin(&mut conn).unwrap();
        tx.commit(&mut conn).unwrap();
        let err = tx.commit(&mut conn).expect_err("double commit must fail");
        assert!(matches!(
            err,
            TransactionError::NoActiveTransaction {
                operation: "commit"
            }
        ));
        assert!(conn.statements.iter().filter(|sql| *sql == "COMMIT").count() == 1);
    }

    #[test]
    fn release_and_rollback_to_pop_everything_above() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();
        let outer = tx.savepoint(&mut conn, Some("outer")).unwrap();
        tx.savepoint(&mut conn, None).unwrap();
        tx.savepoint(&mut conn, Some("inner")).unwrap();
        assert_eq!(tx.depth(), 4);

        tx.rollback_to(&mut conn, &outer).unwrap();
        assert_eq!(tx.depth(), 1);
        assert!(tx.savepoints().is_empty());

        tx.savepoint(&mut conn, Some("a")).unwrap();
        tx.savepoint(&mut conn, Some("b")).unwrap();
        tx.release(&mut conn, "a").unwrap();
        assert_eq!(tx.depth(), 1);

        let err = tx.release(&mut conn, "b").expect_err("b was released with a");
        assert!(matches!(err, TransactionError::UnknownSavepoint { depth: 1, .. }));
    }

    #[test]
    fn savepoint_names_are_validated_and_unique() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();

        let err = tx
            .savepoint(&mut conn, Some("bad name; DROP"))
            .expect_err("invalid name must fail");
        assert!(matches!(err, TransactionError::InvalidSavepointName(_)));

        tx.savepoint(&mut conn, Some("sp1")).unwrap();
        let err = tx
            .savepoint(&mut conn, Some("sp1"))
            .expect_err("duplicate must fail");
        assert!(matches!(err, TransactionError::DuplicateSavepoint { .. }));

        // Generated names skip names the caller already used.
        assert_eq!(tx.savepoint(&mut conn, None).unwrap(), "sp2");
    }

    #[test]
    fn isolation_level_only_outside_transactions() {
        let mut conn = RecordingConnection::default();
        let mut tx = TransactionManager::new(Arc::new(PostgresDialect::new()));
        tx.set_isolation_level(&mut conn, IsolationLevel::Serializable)
            .unwrap();
        assert_eq!(tx.isolation_level(), Some(IsolationLevel::Serializable));

        tx.begin(&mut conn).unwrap();
        for level in IsolationLevel::all() {
            let err = tx
                .set_isolation_level(&mut conn, level)
                .expect_err("active transaction must reject isolation change");
            match err {
                TransactionError::IsolationLevel(inner) => {
                    assert_eq!(inner.requested, level);
                    assert_eq!(inner.depth, 1);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(
            conn.statements[0],
            "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL SERIALIZABLE"
        );
    }

    #[test]
    fn failed_commit_keeps_state_and_reports_context() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();
        tx.begin(&mut conn).unwrap();

        conn.fail_prefix = Some("RELEASE");
        let err = tx.commit(&mut conn).expect_err("release failure must surface");
        match err {
            TransactionError::Execution {
                operation,
                depth,
                source,
            } => {
                assert_eq!(operation, "commit");
                assert_eq!(depth, 2);
                assert!(source.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(tx.depth(), 2);
        assert_eq!(tx.savepoints().len(), 1);
        assert_eq!(tx.state(), TransactionState::Active);
    }

    #[test]
    fn ended_transaction_is_reported_once_then_reset() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();
        tx.begin(&mut conn).unwrap();
        tx.begin(&mut conn).unwrap();
        let issued = conn.statements.len();

        conn.open = Some(false);
        match tx.rollback_to(&mut conn, "sp1") {
            Err(TransactionError::Aborted { operation, depth }) => {
                assert_eq!(operation, "rollback_to");
                assert_eq!(depth, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(conn.statements.len(), issued);
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(tx.depth(), 0);
        assert!(tx.savepoints().is_empty());

        assert!(matches!(
            tx.rollback(&mut conn),
            Err(TransactionError::NoActiveTransaction { .. })
        ));
        assert!(!tx.resync(&conn));

        assert_eq!(tx.begin(&mut conn).unwrap(), 1);
        assert_eq!(conn.statements.last().map(String::as_str), Some("BEGIN"));
    }

    #[test]
    fn failed_control_statement_resyncs_when_transaction_is_gone() {
        let mut conn = RecordingConnection {
            open: Some(true),
            ..RecordingConnection::default()
        };
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();
        tx.begin(&mut conn).unwrap();

        conn.fail_prefix = Some("ROLLBACK TO");
        assert!(tx.rollback(&mut conn).is_err());
        assert_eq!(tx.depth(), 2);
        assert_eq!(tx.state(), TransactionState::Active);

        conn.fail_prefix = Some("RELEASE");
        conn.close_on_failure = true;
        match tx.commit(&mut conn) {
            Err(TransactionError::Execution {
                operation, depth, ..
            }) => {
                assert_eq!(operation, "commit");
                assert_eq!(depth, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(tx.depth(), 0);
    }

    #[test]
    fn unknown_connection_state_never_resets() {
        let mut conn = RecordingConnection::default();
        let mut tx = manager();
        tx.begin(&mut conn).unwrap();
        assert!(!tx.resync(&conn));
        assert_eq!(tx.state(), TransactionState::Active);
    }

    #[test]
    fn invalid_prefix_is_rejected() {
        assert!(manager().with_savepoint_prefix("nested").is_ok());
        assert!(manager().with_savepoint_prefix("1bad").is_err());
    }
}
