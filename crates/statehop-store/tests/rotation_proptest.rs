#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{row, setup_user};
use proptest::prelude::*;
use statehop_core_types::SnapshotId;
use statehop_store::{MemoryStore, SnapshotStore, SqliteStore};
use std::collections::HashSet;

/// After rotation: every pinned row survives, at most `max` unpinned rows
/// remain, and those are exactly the newest unpinned ones.
fn check_rotation(store: &dyn SnapshotStore, ages: &[(i64, bool)], max: usize) {
    let user = setup_user(store, "Steve");
    let rows: Vec<_> = ages
        .iter()
        .map(|(minutes, pinned)| row(user, *minutes, *pinned))
        .collect();
    for r in &rows {
        store.create_snapshot(r).unwrap();
    }
    let before = store.get_all_snapshots(user).unwrap();

    let deleted = store.rotate_snapshots(user, max).unwrap();
    let after = store.get_all_snapshots(user).unwrap();

    let pinned: HashSet<SnapshotId> = rows.iter().filter(|r| r.pinned).map(|r| r.id).collect();
    let kept: HashSet<SnapshotId> = after.iter().map(|r| r.id).collect();
    assert!(pinned.is_subset(&kept));

    let expected_unpinned: Vec<SnapshotId> = before
        .iter()
        .filter(|r| !r.pinned)
        .take(max)
        .map(|r| r.id)
        .collect();
    let kept_unpinned: Vec<SnapshotId> = after.iter().filter(|r| !r.pinned).map(|r| r.id).collect();
    assert_eq!(kept_unpinned, expected_unpinned);
    assert_eq!(deleted, before.len() - after.len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_rotation_memory(
        ages in prop::collection::vec((1i64..10_000, any::<bool>()), 0..20),
        max in 1usize..8,
    ) {
        check_rotation(&MemoryStore::new(), &ages, max);
    }

    #[test]
    fn prop_rotation_sqlite(
        ages in prop::collection::vec((1i64..10_000, any::<bool>()), 0..20),
        max in 1usize..8,
    ) {
        check_rotation(&SqliteStore::open_in_memory().unwrap(), &ages, max);
    }

    #[test]
    fn prop_rotation_is_idempotent(
        ages in prop::collection::vec((1i64..10_000, any::<bool>()), 0..20),
        max in 1usize..8,
    ) {
        let store = MemoryStore::new();
        let user = setup_user(&store, "Alex");
        for (minutes, pinned) in &ages {
            store.create_snapshot(&row(user, *minutes, *pinned)).unwrap();
        }
        store.rotate_snapshots(user, max).unwrap();
        prop_assert_eq!(store.rotate_snapshots(user, max).unwrap(), 0);
    }
}
