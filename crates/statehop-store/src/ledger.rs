//! Snapshot ledger
//!
//! Wraps a [`SnapshotStore`] with the codec and the retention policy, so
//! callers work with [`PackedSnapshot`]s and never see rows or bytes.
//!
//! ## Adding a snapshot
//!
//! 1. Ensure the user's identity record exists
//! 2. Auto-pin if the save cause is configured for it
//! 3. Encode the row
//! 4. In one store call: for an unpinned save, collapse the latest unpinned
//!    snapshot if it falls inside the backup frequency window (snapshots
//!    younger than the handoff TTL are spared), insert, then rotate unpinned
//!    snapshots beyond the configured maximum
//!
//! A rejected insert leaves the previous snapshots untouched.

use crate::contract::{CollapseWindow, SnapshotRow, SnapshotStore, StoredUser};
use crate::errors::{snapshot_not_found, Result};
use statehop_core::config::Settings;
use statehop_core::errors::SyncError;
use statehop_core::snapshot::{now, SaveCause};
use statehop_core::{log_op_end, log_op_error, log_op_start, PackedSnapshot, SnapshotCodec};
use statehop_core_types::{SnapshotId, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How many snapshots are kept, and when the latest one is replaced
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub max_snapshots: usize,
    /// Collapse window; `None` keeps every save
    pub backup_frequency: Option<Duration>,
    /// Snapshots younger than this are never collapsed
    pub handoff_ttl: Duration,
    pub auto_pin: Vec<SaveCause>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_snapshots: 5,
            backup_frequency: None,
            handoff_ttl: Duration::from_secs(10),
            auto_pin: Vec::new(),
        }
    }
}

impl RetentionPolicy {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let sync = &settings.synchronization;
        Ok(Self {
            max_snapshots: sync.max_user_data_snapshots,
            backup_frequency: sync.backup_frequency(),
            handoff_ttl: settings.handoff.ttl(),
            auto_pin: sync.auto_pin_causes().map_err(SyncError::from)?,
        })
    }

    fn collapse_window(&self) -> Option<CollapseWindow> {
        let frequency = chrono::Duration::from_std(self.backup_frequency?).ok()?;
        let ttl = chrono::Duration::from_std(self.handoff_ttl).ok()?;
        let current = now();
        Some(CollapseWindow {
            within: current - frequency,
            protect_from: Some(current - ttl),
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Typed, policy-enforcing access to a snapshot store
#[derive(Clone)]
pub struct SnapshotLedger {
    store: Arc<dyn SnapshotStore>,
    codec: SnapshotCodec,
    policy: RetentionPolicy,
}

impl SnapshotLedger {
    pub fn new(store: Arc<dyn SnapshotStore>, codec: SnapshotCodec, policy: RetentionPolicy) -> Self {
        Self {
            store,
            codec,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    pub fn codec(&self) -> &SnapshotCodec {
        &self.codec
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn ensure_user(&self, user_id: UserId, username: &str) -> Result<()> {
        self.store.ensure_identity(&StoredUser {
            id: user_id,
            username: username.to_string(),
        })
    }

    pub fn users(&self) -> Result<Vec<StoredUser>> {
        self.store.get_all_users()
    }

    pub fn find_user(&self, name_or_id: &str) -> Result<Option<StoredUser>> {
        match name_or_id.parse::<UserId>() {
            Ok(id) => self.store.get_user(id),
            Err(_) => self.store.get_user_by_name(name_or_id),
        }
    }

    /// Persist a new snapshot under the retention policy
    ///
    /// Returns the snapshot as stored (auto-pin applied).
    ///
    /// # Errors
    ///
    /// Propagates the first backend or encoding failure; nothing is retried.
    pub fn add_snapshot(
        &self,
        user_id: UserId,
        username: &str,
        snapshot: PackedSnapshot,
    ) -> Result<PackedSnapshot> {
        log_op_start!(
            "add_snapshot",
            user_id = %user_id,
            snapshot_id = %snapshot.short_id(),
            cause = snapshot.save_cause().as_str()
        );
        let start = Instant::now();

        let result = self.add_snapshot_impl(user_id, username, snapshot).map_err(|e| {
            let e = e.with_user_id(user_id);
            log_op_error!("add_snapshot", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!(
            "add_snapshot",
            duration_ms = elapsed_ms(start),
            user_id = %user_id,
            pinned = result.is_pinned()
        );
        Ok(result)
    }

    fn add_snapshot_impl(
        &self,
        user_id: UserId,
        username: &str,
        mut snapshot: PackedSnapshot,
    ) -> Result<PackedSnapshot> {
        self.ensure_user(user_id, username)?;

        if self.policy.auto_pin.contains(snapshot.save_cause()) {
            snapshot.set_pinned(true);
        }
        let payload = self.encode(&snapshot)?;
        let row = SnapshotRow::new(user_id, &snapshot, payload);

        let window = if snapshot.is_pinned() {
            None
        } else {
            self.policy.collapse_window()
        };
        let outcome = self
            .store
            .insert_snapshot(&row, window.as_ref(), self.policy.max_snapshots)?;

        if let Some(collapsed) = outcome.collapsed {
            tracing::debug!(
                user_id = %user_id,
                snapshot_id = %collapsed.short(),
                "collapsed latest snapshot inside backup window"
            );
        }
        if outcome.rotated > 0 {
            tracing::debug!(user_id = %user_id, deleted = outcome.rotated, "rotated old snapshots");
        }
        Ok(snapshot)
    }

    pub fn encode(&self, snapshot: &PackedSnapshot) -> Result<Vec<u8>> {
        self.codec
            .encode(snapshot)
            .map_err(|e| SyncError::from(e).with_snapshot_id(snapshot.id()))
    }

    /// Decode a stored row through the compatibility gate
    pub fn decode(&self, row: &SnapshotRow) -> Result<PackedSnapshot> {
        self.codec
            .deserialize(&row.payload, row.id, row.timestamp)
            .map_err(|e| {
                SyncError::from(e)
                    .with_user_id(row.user_id)
                    .with_snapshot_id(row.id)
            })
    }

    pub fn latest(&self, user_id: UserId) -> Result<Option<PackedSnapshot>> {
        self.store
            .get_latest_snapshot(user_id)?
            .map(|row| self.decode(&row))
            .transpose()
    }

    /// Id of the newest stored snapshot, without decoding it
    pub fn latest_id(&self, user_id: UserId) -> Result<Option<SnapshotId>> {
        Ok(self.store.get_latest_snapshot(user_id)?.map(|row| row.id))
    }

    pub fn all(&self, user_id: UserId) -> Result<Vec<PackedSnapshot>> {
        self.store
            .get_all_snapshots(user_id)?
            .iter()
            .map(|row| self.decode(row))
            .collect()
    }

    /// Raw rows, newest first; listing works even for undecodable payloads
    pub fn rows(&self, user_id: UserId) -> Result<Vec<SnapshotRow>> {
        self.store.get_all_snapshots(user_id)
    }

    pub fn get(&self, user_id: UserId, id: SnapshotId) -> Result<Option<PackedSnapshot>> {
        self.store
            .get_snapshot(user_id, id)?
            .map(|row| self.decode(&row))
            .transpose()
    }

    /// Look a snapshot up by full id or by its short id prefix
    pub fn resolve(&self, user_id: UserId, id_or_prefix: &str) -> Result<Option<SnapshotRow>> {
        if let Ok(id) = id_or_prefix.parse::<SnapshotId>() {
            return self.store.get_snapshot(user_id, id);
        }
        let prefix = id_or_prefix.to_ascii_lowercase();
        Ok(self
            .store
            .get_all_snapshots(user_id)?
            .into_iter()
            .find(|row| row.short_id().starts_with(&prefix)))
    }

    pub fn pin(&self, user_id: UserId, id: SnapshotId) -> Result<()> {
        self.set_pinned(user_id, id, true)
    }

    pub fn unpin(&self, user_id: UserId, id: SnapshotId) -> Result<()> {
        self.set_pinned(user_id, id, false)
    }

    fn set_pinned(&self, user_id: UserId, id: SnapshotId, pinned: bool) -> Result<()> {
        let op = if pinned { "pin" } else { "unpin" };
        let mut snapshot = self
            .get(user_id, id)?
            .ok_or_else(|| snapshot_not_found(op, user_id, id))?;
        snapshot.set_pinned(pinned);
        let payload = self.encode(&snapshot)?;
        self.store
            .update_snapshot(&SnapshotRow::new(user_id, &snapshot, payload))?;
        tracing::info!(user_id = %user_id, snapshot_id = %id.short(), pinned, "pin state changed");
        Ok(())
    }

    pub fn delete(&self, user_id: UserId, id: SnapshotId) -> Result<bool> {
        let deleted = self.store.delete_snapshot(user_id, id)?;
        if deleted {
            tracing::info!(user_id = %user_id, snapshot_id = %id.short(), "snapshot deleted");
        }
        Ok(deleted)
    }

    /// Re-add an old snapshot as the newest one
    ///
    /// The copy gets a new id and timestamp and the `BACKUP_RESTORE` cause,
    /// so the original stays in the history.
    pub fn restore(&self, user_id: UserId, id: SnapshotId) -> Result<PackedSnapshot> {
        let original = self
            .get(user_id, id)?
            .ok_or_else(|| snapshot_not_found("restore", user_id, id))?;
        let mut copy = original.copy();
        copy.set_save_cause(SaveCause::BackupRestore);
        copy.set_pinned(false);
        let username = self
            .store
            .get_user(user_id)?
            .map(|u| u.username)
            .unwrap_or_default();
        self.add_snapshot(user_id, &username, copy)
    }

    pub fn wipe(&self) -> Result<()> {
        self.store.wipe_database()
    }
}
