//! SQLite snapshot store

use crate::contract::{
    collapse_victim, rotation_victims, CollapseWindow, Insertion, SnapshotRow, SnapshotStore,
    StoredUser,
};
use crate::db;
use crate::errors::{
    duplicate_snapshot, from_rusqlite, poisoned, snapshot_not_found, unknown_user, Result,
};
use crate::migrations::apply_migrations;
use chrono::DateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use statehop_core_types::{SnapshotId, UserId};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SNAPSHOT_COLUMNS: &str =
    "id, user_uuid, timestamp, save_cause, pinned, format_version, payload";

/// Snapshot store on a single SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut conn = db::open(path)?;
        db::configure(&conn)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = db::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(from_rusqlite)?;
        apply_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self, op: &str) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned(op))
    }

    fn list(conn: &Connection, user_id: UserId) -> Result<Vec<SnapshotRow>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM snapshots WHERE user_uuid = ?1
                 ORDER BY timestamp_ms DESC, rowid DESC",
                SNAPSHOT_COLUMNS
            ))
            .map_err(from_rusqlite)?;
        let rows = stmt
            .query_map([user_id.to_string()], map_row)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(rows)
    }

    fn delete(conn: &Connection, user_id: UserId, id: SnapshotId) -> Result<bool> {
        let deleted = conn
            .execute(
                "DELETE FROM snapshots WHERE id = ?1 AND user_uuid = ?2",
                rusqlite::params![id.to_string(), user_id.to_string()],
            )
            .map_err(from_rusqlite)?;
        Ok(deleted > 0)
    }

    /// User and id checks, then the insert itself
    fn insert(conn: &Connection, op: &str, row: &SnapshotRow) -> Result<()> {
        let user_known = conn
            .query_row(
                "SELECT 1 FROM users WHERE uuid = ?1",
                [row.user_id.to_string()],
                |_| Ok(()),
            )
            .optional()
            .map_err(from_rusqlite)?
            .is_some();
        if !user_known {
            return Err(unknown_user(op, row.user_id));
        }

        let exists = conn
            .query_row(
                "SELECT 1 FROM snapshots WHERE id = ?1",
                [row.id.to_string()],
                |_| Ok(()),
            )
            .optional()
            .map_err(from_rusqlite)?
            .is_some();
        if exists {
            return Err(duplicate_snapshot(row.user_id, row.id));
        }

        conn.execute(
            "INSERT INTO snapshots
                (id, user_uuid, timestamp, timestamp_ms, save_cause, pinned, format_version, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                row.id.to_string(),
                row.user_id.to_string(),
                row.timestamp.to_rfc3339(),
                row.timestamp.timestamp_millis(),
                row.save_cause.as_str(),
                row.pinned,
                row.format_version,
                row.payload,
            ],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    let id: String = row.get(0)?;
    let user: String = row.get(1)?;
    let timestamp: String = row.get(2)?;
    let cause: String = row.get(3)?;
    Ok(SnapshotRow {
        id: id.parse().map_err(|e| conversion_error(0, e))?,
        user_id: user.parse().map_err(|e| conversion_error(1, e))?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp).map_err(|e| conversion_error(2, e))?,
        save_cause: cause.parse().map_err(|e| conversion_error(3, e))?,
        pinned: row.get(4)?,
        format_version: row.get(5)?,
        payload: row.get(6)?,
    })
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<StoredUser> {
    let id: String = row.get(0)?;
    Ok(StoredUser {
        id: id.parse().map_err(|e| conversion_error(0, e))?,
        username: row.get(1)?,
    })
}

impl SnapshotStore for SqliteStore {
    fn ensure_identity(&self, user: &StoredUser) -> Result<()> {
        let conn = self.conn("ensure_identity")?;
        conn.execute(
            "INSERT INTO users (uuid, username) VALUES (?1, ?2)
             ON CONFLICT(uuid) DO UPDATE SET username = excluded.username",
            rusqlite::params![user.id.to_string(), user.username],
        )
        .map_err(from_rusqlite)?;
        Ok(())
    }

    fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let conn = self.conn("get_user")?;
        conn.query_row(
            "SELECT uuid, username FROM users WHERE uuid = ?1",
            [user_id.to_string()],
            map_user,
        )
        .optional()
        .map_err(from_rusqlite)
    }

    fn get_user_by_name(&self, username: &str) -> Result<Option<StoredUser>> {
        let conn = self.conn("get_user_by_name")?;
        conn.query_row(
            "SELECT uuid, username FROM users WHERE username = ?1 COLLATE NOCASE LIMIT 1",
            [username],
            map_user,
        )
        .optional()
        .map_err(from_rusqlite)
    }

    fn get_all_users(&self) -> Result<Vec<StoredUser>> {
        let conn = self.conn("get_all_users")?;
        let mut stmt = conn
            .prepare("SELECT uuid, username FROM users ORDER BY username")
            .map_err(from_rusqlite)?;
        let users = stmt
            .query_map([], map_user)
            .map_err(from_rusqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(from_rusqlite)?;
        Ok(users)
    }

    fn create_snapshot(&self, row: &SnapshotRow) -> Result<()> {
        row.validate()?;
        let conn = self.conn("create_snapshot")?;
        Self::insert(&conn, "create_snapshot", row)
    }

    fn get_latest_snapshot(&self, user_id: UserId) -> Result<Option<SnapshotRow>> {
        let conn = self.conn("get_latest_snapshot")?;
        conn.query_row(
            &format!(
                "SELECT {} FROM snapshots WHERE user_uuid = ?1
                 ORDER BY timestamp_ms DESC, rowid DESC LIMIT 1",
                SNAPSHOT_COLUMNS
            ),
            [user_id.to_string()],
            map_row,
        )
        .optional()
        .map_err(from_rusqlite)
    }

    fn get_all_snapshots(&self, user_id: UserId) -> Result<Vec<SnapshotRow>> {
        let conn = self.conn("get_all_snapshots")?;
        Self::list(&conn, user_id)
    }

    fn get_snapshot(&self, user_id: UserId, id: SnapshotId) -> Result<Option<SnapshotRow>> {
        let conn = self.conn("get_snapshot")?;
        conn.query_row(
            &format!(
                "SELECT {} FROM snapshots WHERE id = ?1 AND user_uuid = ?2",
                SNAPSHOT_COLUMNS
            ),
            [id.to_string(), user_id.to_string()],
            map_row,
        )
        .optional()
        .map_err(from_rusqlite)
    }

    fn update_snapshot(&self, row: &SnapshotRow) -> Result<()> {
        row.validate()?;
        let conn = self.conn("update_snapshot")?;
        let updated = conn
            .execute(
                "UPDATE snapshots
                 SET save_cause = ?1, pinned = ?2, format_version = ?3, payload = ?4
                 WHERE id = ?5 AND user_uuid = ?6",
                rusqlite::params![
                    row.save_cause.as_str(),
                    row.pinned,
                    row.format_version,
                    row.payload,
                    row.id.to_string(),
                    row.user_id.to_string(),
                ],
            )
            .map_err(from_rusqlite)?;
        if updated == 0 {
            return Err(snapshot_not_found("update_snapshot", row.user_id, row.id));
        }
        Ok(())
    }

    fn delete_snapshot(&self, user_id: UserId, id: SnapshotId) -> Result<bool> {
        let conn = self.conn("delete_snapshot")?;
        Self::delete(&conn, user_id, id)
    }

    fn rotate_snapshots(&self, user_id: UserId, max: usize) -> Result<usize> {
        let mut conn = self.conn("rotate_snapshots")?;
        let tx = conn.transaction().map_err(from_rusqlite)?;
        let victims = rotation_victims(&Self::list(&tx, user_id)?, max);
        for id in &victims {
            Self::delete(&tx, user_id, *id)?;
        }
        tx.commit().map_err(from_rusqlite)?;
        Ok(victims.len())
    }

    fn rotate_latest_snapshot(
        &self,
        user_id: UserId,
        window: &CollapseWindow,
    ) -> Result<Option<SnapshotId>> {
        let mut conn = self.conn("rotate_latest_snapshot")?;
        let tx = conn.transaction().map_err(from_rusqlite)?;
        let victim = collapse_victim(&Self::list(&tx, user_id)?, window);
        if let Some(id) = victim {
            Self::delete(&tx, user_id, id)?;
        }
        tx.commit().map_err(from_rusqlite)?;
        Ok(victim)
    }

    fn insert_snapshot(
        &self,
        row: &SnapshotRow,
        collapse: Option<&CollapseWindow>,
        max: usize,
    ) -> Result<Insertion> {
        row.validate()?;
        let mut conn = self.conn("insert_snapshot")?;
        let tx = conn.transaction().map_err(from_rusqlite)?;

        // Picked before the insert, deleted only once the insert succeeded
        let collapsed = match collapse {
            Some(window) => collapse_victim(&Self::list(&tx, row.user_id)?, window),
            None => None,
        };
        Self::insert(&tx, "insert_snapshot", row)?;
        if let Some(id) = collapsed {
            Self::delete(&tx, row.user_id, id)?;
        }

        let victims = rotation_victims(&Self::list(&tx, row.user_id)?, max);
        for id in &victims {
            Self::delete(&tx, row.user_id, *id)?;
        }
        tx.commit().map_err(from_rusqlite)?;

        Ok(Insertion {
            collapsed,
            rotated: victims.len(),
        })
    }

    fn wipe_database(&self) -> Result<()> {
        let conn = self.conn("wipe_database")?;
        conn.execute_batch("DELETE FROM snapshots; DELETE FROM users;")
            .map_err(from_rusqlite)?;
        tracing::warn!("snapshot database wiped");
        Ok(())
    }
}
