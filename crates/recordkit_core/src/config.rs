//! Backend configuration loading and validation.
//!
//! # Responsibility
//! - Deserialize backend settings from JSON with defaults for omitted fields.
//! - Reject settings the backend cannot honor before a connection is opened.

use crate::dialect::DialectKind;
use crate::logging::{default_log_level, init_logging, normalize_level, LoggingError};
use crate::tx::{is_valid_savepoint_name, IsolationLevel, DEFAULT_SAVEPOINT_PREFIX};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings for one storage backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub dialect: DialectKind,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    /// Applied once right after the connection opens.
    pub isolation_level: Option<IsolationLevel>,
    pub savepoint_prefix: String,
    /// Level used by [`BackendConfig::init_logging`].
    pub log_level: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            busy_timeout_ms: 5_000,
            foreign_keys: true,
            isolation_level: None,
            savepoint_prefix: DEFAULT_SAVEPOINT_PREFIX.to_string(),
            log_level: default_log_level().to_string(),
        }
    }
}

impl BackendConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "busy_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if let Err(err) = normalize_level(&self.log_level) {
            return Err(ConfigError::Invalid {
                field: "log_level",
                message: err.to_string(),
            });
        }
        if !is_valid_savepoint_name(&self.savepoint_prefix) {
            return Err(ConfigError::Invalid {
                field: "savepoint_prefix",
                message: format!("`{}` is not an SQL identifier", self.savepoint_prefix),
            });
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Starts process-wide file logging at `log_level` under the absolute `log_dir`.
    pub fn init_logging(&self, log_dir: impl AsRef<Path>) -> Result<(), LoggingError> {
        init_logging(&self.log_level, log_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendConfig, ConfigError};
    use crate::dialect::DialectKind;
    use crate::tx::IsolationLevel;

    #[test]
    fn empty_object_uses_defaults() {
        let config = BackendConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.dialect, DialectKind::Sqlite);
        assert_eq!(config.busy_timeout().as_millis(), 5_000);
    }

    #[test]
    fn parses_explicit_fields() {
        let config = BackendConfig::from_json_str(
            r#"{"dialect":"postgres","isolation_level":"repeatable_read","savepoint_prefix":"lvl"}"#,
        )
        .unwrap();
        assert_eq!(config.dialect, DialectKind::Postgres);
        assert_eq!(config.isolation_level, Some(IsolationLevel::RepeatableRead));
        assert_eq!(config.savepoint_prefix, "lvl");
        assert!(config.foreign_keys);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = BackendConfig::from_json_str(r#"{"busy_timeout_ms":0}"#)
            .expect_err("zero timeout must be rejected");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "busy_timeout_ms",
                ..
            }
        ));

        let err = BackendConfig::from_json_str(r#"{"savepoint_prefix":"sp-"}"#)
            .expect_err("prefix must be an identifier");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "savepoint_prefix",
                ..
            }
        ));

        let err = BackendConfig::from_json_str(r#"{"log_level":"loud"}"#)
            .expect_err("unknown level must be rejected");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "log_level",
                ..
            }
        ));

        let err = BackendConfig::from_json_str(r#"{"dialect":"oracle"}"#)
            .expect_err("unknown dialect must be rejected");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
