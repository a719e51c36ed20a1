//! SQLite connection management

use crate::errors::{from_rusqlite, Result};
use rusqlite::Connection;
use statehop_core::errors::{SyncError, SyncErrorKind};
use std::path::Path;

/// Open the database file, creating its directory if needed
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            SyncError::new(SyncErrorKind::Io)
                .with_op("open_database")
                .with_message(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }
    Connection::open(path).map_err(from_rusqlite)
}

pub fn open_in_memory() -> Result<Connection> {
    Connection::open_in_memory().map_err(from_rusqlite)
}

/// Foreign keys on, WAL journal
pub fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(from_rusqlite)?;
    // journal_mode returns a row, so it cannot go through execute
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .map_err(from_rusqlite)?;
    Ok(())
}
