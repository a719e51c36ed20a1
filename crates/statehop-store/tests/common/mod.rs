use chrono::{DateTime, Duration, FixedOffset};
use statehop_core::snapshot::{now, SaveCause};
use statehop_core_types::{SnapshotId, UserId};
use statehop_store::{SnapshotRow, SnapshotStore, StoredUser};

/// Register a fresh user and return its id
#[allow(dead_code)]
pub fn setup_user(store: &dyn SnapshotStore, name: &str) -> UserId {
    let id = UserId::random();
    store
        .ensure_identity(&StoredUser {
            id,
            username: name.to_string(),
        })
        .unwrap();
    id
}

/// A row `minutes_ago` old with an opaque payload
#[allow(dead_code)]
pub fn row(user_id: UserId, minutes_ago: i64, pinned: bool) -> SnapshotRow {
    row_at(user_id, now() - Duration::minutes(minutes_ago), pinned)
}

#[allow(dead_code)]
pub fn row_at(user_id: UserId, timestamp: DateTime<FixedOffset>, pinned: bool) -> SnapshotRow {
    let id = SnapshotId::new();
    SnapshotRow {
        id,
        user_id,
        timestamp,
        save_cause: SaveCause::WorldSave,
        pinned,
        format_version: 5,
        payload: id.to_string().into_bytes(),
    }
}
