//! Driver failure classification.

use crate::compile::CompileError;
use crate::db::DbError;
use crate::tx::{TransactionError, TransactionState};
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    ConstraintViolation,
    Deadlock,
    LockTimeout,
    Syntax,
    Other,
}

impl ExecutionErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConstraintViolation => "constraint_violation",
            Self::Deadlock => "deadlock",
            Self::LockTimeout => "lock_timeout",
            Self::Syntax => "syntax",
            Self::Other => "other",
        }
    }
}

/// Failure reported by the database while running a statement.
///
/// The message is the driver's text, unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    kind: ExecutionErrorKind,
    message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ExecutionErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Deadlocks and lock timeouts may succeed when the unit of work is retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ExecutionErrorKind::Deadlock | ExecutionErrorKind::LockTimeout
        )
    }
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

impl Error for ExecutionError {}

impl From<rusqlite::Error> for ExecutionError {
    fn from(value: rusqlite::Error) -> Self {
        Self::new(classify(&value), value.to_string())
    }
}

fn classify(err: &rusqlite::Error) -> ExecutionErrorKind {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::ConstraintViolation => ExecutionErrorKind::ConstraintViolation,
            ErrorCode::DatabaseBusy => ExecutionErrorKind::LockTimeout,
            ErrorCode::DatabaseLocked => {
                if message_contains(message.as_deref(), "deadlock") {
                    ExecutionErrorKind::Deadlock
                } else {
                    ExecutionErrorKind::LockTimeout
                }
            }
            _ if is_syntax_message(message.as_deref()) => ExecutionErrorKind::Syntax,
            _ => ExecutionErrorKind::Other,
        },
        _ => ExecutionErrorKind::Other,
    }
}

fn is_syntax_message(message: Option<&str>) -> bool {
    message_contains(message, "syntax error")
        || message_contains(message, "no such column")
        || message_contains(message, "no such table")
        || message_contains(message, "selects to the left and right of")
}

fn message_contains(message: Option<&str>, needle: &str) -> bool {
    message
        .map(|msg| msg.to_lowercase().contains(needle))
        .unwrap_or(false)
}

#[derive(Debug)]
pub enum BackendError {
    Compile(CompileError),
    Transaction(TransactionError),
    Db(DbError),
    /// A statement failed; carries the transaction context as it stands afterwards.
    Execution {
        source: ExecutionError,
        depth: usize,
        state: TransactionState,
    },
    UnsupportedDialect(&'static str),
}

impl BackendError {
    /// The classified driver failure, if this error came from the database.
    pub fn execution(&self) -> Option<&ExecutionError> {
        match self {
            Self::Execution { source, .. } => Some(source),
            Self::Transaction(TransactionError::Execution { source, .. }) => Some(source),
            _ => None,
        }
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compile(err) => write!(f, "{err}"),
            Self::Transaction(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Execution {
                source,
                depth,
                state,
            } => write!(
                f,
                "{source} (transaction {} at depth {depth})",
                state.as_str()
            ),
            Self::UnsupportedDialect(name) => {
                write!(f, "storage backend cannot run the `{name}` dialect")
            }
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Compile(err) => Some(err),
            Self::Transaction(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Execution { source, .. } => Some(source),
            Self::UnsupportedDialect(_) => None,
        }
    }
}

impl From<CompileError> for BackendError {
    fn from(value: CompileError) -> Self {
        Self::Compile(value)
    }
}

impl From<TransactionError> for BackendError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}
