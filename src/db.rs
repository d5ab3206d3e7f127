//! SQLite pool for the artifact table.
//!
//! The pool runs in WAL mode with a busy timeout, so `uscout match` can
//! read while a scan replaces the table. The database file and its parent
//! directories are created on first use.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the database named in `[db]`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    open(
        &config.db.path,
        config.db.max_connections,
        config.db.busy_timeout(),
    )
    .await
}

/// Open the database at `db_path` with default pool settings.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    open(db_path, DEFAULT_MAX_CONNECTIONS, DEFAULT_BUSY_TIMEOUT).await
}

async fn open(db_path: &Path, max_connections: u32, busy_timeout: Duration) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}
