//! In-memory snapshot store
//!
//! Keeps one document per user holding that user's rows. Used in tests and
//! by single-process setups that do not need durability.

use crate::contract::{
    collapse_victim, rotation_victims, CollapseWindow, Insertion, SnapshotRow, SnapshotStore,
    StoredUser,
};
use crate::errors::{duplicate_snapshot, poisoned, snapshot_not_found, unknown_user, Result};
use statehop_core_types::{SnapshotId, UserId};
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct UserDocument {
    username: String,
    /// Rows with their insertion sequence
    snapshots: Vec<(u64, SnapshotRow)>,
}

impl UserDocument {
    fn newest_first(&self) -> Vec<SnapshotRow> {
        let mut rows: Vec<&(u64, SnapshotRow)> = self.snapshots.iter().collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            b.timestamp
                .timestamp_millis()
                .cmp(&a.timestamp.timestamp_millis())
                .then(seq_b.cmp(seq_a))
        });
        rows.into_iter().map(|(_, row)| row.clone()).collect()
    }

    fn remove(&mut self, id: SnapshotId) -> bool {
        let before = self.snapshots.len();
        self.snapshots.retain(|(_, row)| row.id != id);
        self.snapshots.len() != before
    }
}

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, UserDocument>,
    snapshot_ids: HashSet<SnapshotId>,
    next_seq: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl State {
    fn check_insert(&self, op: &str, row: &SnapshotRow) -> Result<()> {
        if !self.users.contains_key(&row.user_id) {
            return Err(unknown_user(op, row.user_id));
        }
        if self.snapshot_ids.contains(&row.id) {
            return Err(duplicate_snapshot(row.user_id, row.id));
        }
        Ok(())
    }

    fn push(&mut self, row: &SnapshotRow) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.snapshot_ids.insert(row.id);
        if let Some(doc) = self.users.get_mut(&row.user_id) {
            doc.snapshots.push((seq, row.clone()));
        }
    }

    fn remove(&mut self, user_id: UserId, ids: &[SnapshotId]) {
        if let Some(doc) = self.users.get_mut(&user_id) {
            for id in ids {
                if doc.remove(*id) {
                    self.snapshot_ids.remove(id);
                }
            }
        }
    }

    fn newest_first(&self, user_id: UserId) -> Vec<SnapshotRow> {
        self.users
            .get(&user_id)
            .map(UserDocument::newest_first)
            .unwrap_or_default()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, op: &str) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| poisoned(op))
    }

    fn write(&self, op: &str) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| poisoned(op))
    }
}

impl SnapshotStore for MemoryStore {
    fn ensure_identity(&self, user: &StoredUser) -> Result<()> {
        let mut state = self.write("ensure_identity")?;
        state.users.entry(user.id).or_default().username = user.username.clone();
        Ok(())
    }

    fn get_user(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let state = self.read("get_user")?;
        Ok(state.users.get(&user_id).map(|doc| StoredUser {
            id: user_id,
            username: doc.username.clone(),
        }))
    }

    fn get_user_by_name(&self, username: &str) -> Result<Option<StoredUser>> {
        let state = self.read("get_user_by_name")?;
        Ok(state
            .users
            .iter()
            .find(|(_, doc)| doc.username.eq_ignore_ascii_case(username))
            .map(|(id, doc)| StoredUser {
                id: *id,
                username: doc.username.clone(),
            }))
    }

    fn get_all_users(&self) -> Result<Vec<StoredUser>> {
        let state = self.read("get_all_users")?;
        let mut users: Vec<StoredUser> = state
            .users
            .iter()
            .map(|(id, doc)| StoredUser {
                id: *id,
                username: doc.username.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    fn create_snapshot(&self, row: &SnapshotRow) -> Result<()> {
        row.validate()?;
        let mut state = self.write("create_snapshot")?;
        state.check_insert("create_snapshot", row)?;
        state.push(row);
        Ok(())
    }

    fn get_latest_snapshot(&self, user_id: UserId) -> Result<Option<SnapshotRow>> {
        Ok(self.get_all_snapshots(user_id)?.into_iter().next())
    }

    fn get_all_snapshots(&self, user_id: UserId) -> Result<Vec<SnapshotRow>> {
        let state = self.read("get_all_snapshots")?;
        Ok(state
            .users
            .get(&user_id)
            .map(UserDocument::newest_first)
            .unwrap_or_default())
    }

    fn get_snapshot(&self, user_id: UserId, id: SnapshotId) -> Result<Option<SnapshotRow>> {
        let state = self.read("get_snapshot")?;
        Ok(state.users.get(&user_id).and_then(|doc| {
            doc.snapshots
                .iter()
                .find(|(_, row)| row.id == id)
                .map(|(_, row)| row.clone())
        }))
    }

    fn update_snapshot(&self, row: &SnapshotRow) -> Result<()> {
        row.validate()?;
        let mut state = self.write("update_snapshot")?;
        let existing = state
            .users
            .get_mut(&row.user_id)
            .and_then(|doc| doc.snapshots.iter_mut().find(|(_, r)| r.id == row.id))
            .ok_or_else(|| snapshot_not_found("update_snapshot", row.user_id, row.id))?;
        let (_, stored) = existing;
        stored.save_cause = row.save_cause.clone();
        stored.pinned = row.pinned;
        stored.format_version = row.format_version;
        stored.payload = row.payload.clone();
        Ok(())
    }

    fn delete_snapshot(&self, user_id: UserId, id: SnapshotId) -> Result<bool> {
        let mut state = self.write("delete_snapshot")?;
        let removed = state
            .users
            .get_mut(&user_id)
            .is_some_and(|doc| doc.remove(id));
        if removed {
            state.snapshot_ids.remove(&id);
        }
        Ok(removed)
    }

    fn rotate_snapshots(&self, user_id: UserId, max: usize) -> Result<usize> {
        let mut state = self.write("rotate_snapshots")?;
        let State {
            users,
            snapshot_ids,
            ..
        } = &mut *state;
        let Some(doc) = users.get_mut(&user_id) else {
            return Ok(0);
        };
        let victims = rotation_victims(&doc.newest_first(), max);
        for id in &victims {
            doc.remove(*id);
            snapshot_ids.remove(id);
        }
        Ok(victims.len())
    }

    fn rotate_latest_snapshot(
        &self,
        user_id: UserId,
        window: &CollapseWindow,
    ) -> Result<Option<SnapshotId>> {
        let mut state = self.write("rotate_latest_snapshot")?;
        let State {
            users,
            snapshot_ids,
            ..
        } = &mut *state;
        let Some(doc) = users.get_mut(&user_id) else {
            return Ok(None);
        };
        let victim = collapse_victim(&doc.newest_first(), window);
        if let Some(id) = victim {
            doc.remove(id);
            snapshot_ids.remove(&id);
        }
        Ok(victim)
    }

    fn insert_snapshot(
        &self,
        row: &SnapshotRow,
        collapse: Option<&CollapseWindow>,
        max: usize,
    ) -> Result<Insertion> {
        row.validate()?;
        let mut state = self.write("insert_snapshot")?;
        state.check_insert("insert_snapshot", row)?;

        let collapsed =
            collapse.and_then(|window| collapse_victim(&state.newest_first(row.user_id), window));
        if let Some(id) = collapsed {
            state.remove(row.user_id, &[id]);
        }
        state.push(row);
        let victims = rotation_victims(&state.newest_first(row.user_id), max);
        state.remove(row.user_id, &victims);

        Ok(Insertion {
            collapsed,
            rotated: victims.len(),
        })
    }

    fn wipe_database(&self) -> Result<()> {
        let mut state = self.write("wipe_database")?;
        *state = State::default();
        Ok(())
    }
}
