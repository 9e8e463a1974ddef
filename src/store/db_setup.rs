use std::time::Duration;

use rusqlite::Connection;

use crate::error::PublishResult;
use crate::util::now_utc_string;

pub(crate) const DB_SCHEMA_VERSION: &str = "0.1.0";

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn configure_connection(connection: &Connection) -> PublishResult<()> {
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> PublishResult<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS published_file (
          id TEXT PRIMARY KEY,
          filename TEXT NOT NULL UNIQUE,
          parent_id TEXT REFERENCES published_file(id),
          published_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_published_file_parent ON published_file(parent_id);

        CREATE TRIGGER IF NOT EXISTS published_file_two_levels
        BEFORE INSERT ON published_file
        WHEN NEW.parent_id IS NOT NULL
          AND (SELECT parent_id FROM published_file WHERE id = NEW.parent_id) IS NOT NULL
        BEGIN
          SELECT RAISE(ABORT, 'attachment parent must be a root document');
        END;
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
