//! Backend-agnostic snapshot persistence
//!
//! Backends deal in [`SnapshotRow`]s: the encoded snapshot bytes plus the
//! columns needed to order, rotate and pin without decoding. Decoding (and
//! with it the compatibility gate) happens above the store, in
//! [`crate::SnapshotLedger`].
//!
//! All calls block; async callers go through `spawn_blocking`.

use crate::errors::{invalid_row, Result};
use chrono::{DateTime, FixedOffset};
use statehop_core::snapshot::{SaveCause, MAX_CAUSE_LEN};
use statehop_core::PackedSnapshot;
use statehop_core_types::{SnapshotId, UserId};

/// A user's stable id and last known display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: UserId,
    pub username: String,
}

/// One persisted snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub id: SnapshotId,
    pub user_id: UserId,
    pub timestamp: DateTime<FixedOffset>,
    pub save_cause: SaveCause,
    pub pinned: bool,
    pub format_version: u32,
    pub payload: Vec<u8>,
}

impl SnapshotRow {
    /// Row for `snapshot`, whose encoded form is `payload`
    pub fn new(user_id: UserId, snapshot: &PackedSnapshot, payload: Vec<u8>) -> Self {
        Self {
            id: snapshot.id(),
            user_id,
            timestamp: snapshot.timestamp(),
            save_cause: snapshot.save_cause().clone(),
            pinned: snapshot.is_pinned(),
            format_version: snapshot.meta().format_version(),
            payload,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.short()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.save_cause.as_str().chars().count() > MAX_CAUSE_LEN {
            return Err(invalid_row(format!(
                "save cause '{}' exceeds {} characters",
                self.save_cause, MAX_CAUSE_LEN
            )));
        }
        Ok(())
    }
}

/// Bounds for collapsing the latest snapshot
///
/// The latest unpinned snapshot is collapsed only when its timestamp is
/// strictly after `within` and, when set, strictly before `protect_from`.
/// A snapshot newer than `protect_from` may still be the one a handoff
/// marker names, so it is never collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseWindow {
    pub within: DateTime<FixedOffset>,
    pub protect_from: Option<DateTime<FixedOffset>>,
}

impl CollapseWindow {
    pub fn covers(&self, timestamp: DateTime<FixedOffset>) -> bool {
        timestamp > self.within && self.protect_from.map_or(true, |guard| timestamp < guard)
    }
}

/// Rows an [`SnapshotStore::insert_snapshot`] removed around the new one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Insertion {
    pub collapsed: Option<SnapshotId>,
    pub rotated: usize,
}

/// Durable per-user snapshot storage
///
/// Listings are newest first: timestamp descending, then insertion order
/// descending for equal timestamps.
pub trait SnapshotStore: Send + Sync {
    /// Insert or rename a user
    fn ensure_identity(&self, user: &StoredUser) -> Result<()>;

    fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>>;

    fn get_user_by_name(&self, username: &str) -> Result<Option<StoredUser>>;

    fn get_all_users(&self) -> Result<Vec<StoredUser>>;

    /// Append a snapshot
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the id is taken, `NotFound` if the user has no
    /// identity record.
    fn create_snapshot(&self, row: &SnapshotRow) -> Result<()>;

    fn get_latest_snapshot(&self, user_id: UserId) -> Result<Option<SnapshotRow>>;

    fn get_all_snapshots(&self, user_id: UserId) -> Result<Vec<SnapshotRow>>;

    fn get_snapshot(&self, user_id: UserId, id: SnapshotId) -> Result<Option<SnapshotRow>>;

    /// Overwrite cause, pinned flag, format version and payload
    ///
    /// # Errors
    ///
    /// `NotFound` if the user has no snapshot with this id.
    fn update_snapshot(&self, row: &SnapshotRow) -> Result<()>;

    /// Returns whether a row was deleted
    fn delete_snapshot(&self, user_id: UserId, id: SnapshotId) -> Result<bool>;

    /// Delete unpinned snapshots beyond the newest `max`; returns how many
    fn rotate_snapshots(&self, user_id: UserId, max: usize) -> Result<usize>;

    /// Delete the latest unpinned snapshot if `window` covers it
    fn rotate_latest_snapshot(
        &self,
        user_id: UserId,
        window: &CollapseWindow,
    ) -> Result<Option<SnapshotId>>;

    /// Collapse, append and rotate as one unit
    ///
    /// With `collapse` set, the latest unpinned snapshot it covers is
    /// replaced by `row`; afterwards unpinned snapshots beyond `max` are
    /// dropped. If the append is rejected nothing is deleted.
    ///
    /// # Errors
    ///
    /// As [`SnapshotStore::create_snapshot`].
    fn insert_snapshot(
        &self,
        row: &SnapshotRow,
        collapse: Option<&CollapseWindow>,
        max: usize,
    ) -> Result<Insertion>;

    /// Remove every user and snapshot
    fn wipe_database(&self) -> Result<()>;
}

/// Pick rows past the first `max` unpinned ones, from a newest-first listing
pub(crate) fn rotation_victims(rows: &[SnapshotRow], max: usize) -> Vec<SnapshotId> {
    rows.iter()
        .filter(|r| !r.pinned)
        .skip(max)
        .map(|r| r.id)
        .collect()
}

/// The collapsible row, from a newest-first listing
pub(crate) fn collapse_victim(rows: &[SnapshotRow], window: &CollapseWindow) -> Option<SnapshotId> {
    rows.iter()
        .find(|r| !r.pinned)
        .filter(|r| window.covers(r.timestamp))
        .map(|r| r.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use statehop_core::snapshot::now;

    #[test]
    fn test_window_guard_protects_recent() {
        let current = now();
        let window = CollapseWindow {
            within: current - Duration::hours(4),
            protect_from: Some(current - Duration::seconds(10)),
        };
        assert!(window.covers(current - Duration::minutes(5)));
        assert!(!window.covers(current - Duration::seconds(2)));
        assert!(!window.covers(current - Duration::hours(5)));
    }

    #[test]
    fn test_window_without_guard() {
        let current = now();
        let window = CollapseWindow {
            within: current - Duration::hours(1),
            protect_from: None,
        };
        assert!(window.covers(current));
    }
}
