use super::DbResult;
use crate::config::BackendConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens a SQLite database file and applies connection settings.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, config: &BackendConfig) -> DbResult<Connection> {
    open_with("file", config, || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies connection settings.
pub fn open_db_in_memory(config: &BackendConfig) -> DbResult<Connection> {
    open_with("memory", config, Connection::open_in_memory)
}

fn open_with(
    mode: &'static str,
    config: &BackendConfig,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={} foreign_keys={}",
                mode,
                started_at.elapsed().as_millis(),
                config.foreign_keys
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err.into())
        }
    }
}

fn bootstrap_connection(conn: &Connection, config: &BackendConfig) -> rusqlite::Result<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(config.busy_timeout())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{open_db, open_db_in_memory};
    use crate::config::BackendConfig;

    fn foreign_keys_enabled(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn applies_foreign_key_setting() {
        let conn = open_db_in_memory(&BackendConfig::default()).unwrap();
        assert_eq!(foreign_keys_enabled(&conn), 1);

        let config = BackendConfig {
            foreign_keys: false,
            ..BackendConfig::default()
        };
        let conn = open_db_in_memory(&config).unwrap();
        assert_eq!(foreign_keys_enabled(&conn), 0);
    }

    #[test]
    fn opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.sqlite3");
        let conn = open_db(&path, &BackendConfig::default()).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);")
            .unwrap();
        assert!(path.exists());
    }
}
