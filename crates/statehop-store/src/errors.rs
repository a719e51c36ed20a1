//! Error helpers for the store
//!
//! Everything the store returns is a [`SyncError`]; these constructors keep
//! kinds and op names consistent across the backends.

use statehop_core::errors::{SyncError, SyncErrorKind};
use statehop_core_types::{SnapshotId, UserId};

pub type Result<T> = std::result::Result<T, SyncError>;

pub fn migration_error(migration_id: &str, reason: &str) -> SyncError {
    SyncError::new(SyncErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> SyncError {
    SyncError::new(SyncErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: recorded {}, embedded {}",
            migration_id, expected, actual
        ))
}

pub fn from_rusqlite(err: rusqlite::Error) -> SyncError {
    SyncError::new(SyncErrorKind::Persistence)
        .with_op("sqlite")
        .with_message(err.to_string())
}

pub fn unknown_user(op: &str, user_id: UserId) -> SyncError {
    SyncError::new(SyncErrorKind::NotFound)
        .with_op(op)
        .with_user_id(user_id)
        .with_message(format!("User {} has no identity record", user_id))
}

pub fn snapshot_not_found(op: &str, user_id: UserId, snapshot_id: SnapshotId) -> SyncError {
    SyncError::new(SyncErrorKind::NotFound)
        .with_op(op)
        .with_user_id(user_id)
        .with_snapshot_id(snapshot_id)
        .with_message(format!("Snapshot {} not found", snapshot_id))
}

pub fn duplicate_snapshot(user_id: UserId, snapshot_id: SnapshotId) -> SyncError {
    SyncError::new(SyncErrorKind::AlreadyExists)
        .with_op("create_snapshot")
        .with_user_id(user_id)
        .with_snapshot_id(snapshot_id)
        .with_message(format!("Snapshot {} already exists", snapshot_id))
}

pub fn invalid_row(reason: impl Into<String>) -> SyncError {
    SyncError::new(SyncErrorKind::InvalidInput)
        .with_op("snapshot_row")
        .with_message(reason)
}

pub fn poisoned(op: &str) -> SyncError {
    SyncError::new(SyncErrorKind::Internal)
        .with_op(op)
        .with_message("store lock poisoned by a panicking writer")
}
