#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration as ChronoDuration;
use statehop_core::data::Food;
use statehop_core::errors::SyncErrorKind;
use statehop_core::snapshot::{now, FormatContext, HostVersion, SaveCause, UnpackedSnapshot};
use statehop_core::{FeatureToggles, PackedSnapshot, RegistryBuilder, SerializerRegistry, SnapshotCodec};
use statehop_core_types::UserId;
use statehop_store::{MemoryStore, RetentionPolicy, SnapshotLedger, SnapshotStore, SqliteStore};
use std::sync::Arc;
use std::time::Duration;

fn context() -> FormatContext {
    FormatContext::new(HostVersion::new(1, 20, 4), "paper", "lobby-1")
}

fn registry() -> SerializerRegistry {
    RegistryBuilder::with_builtins()
        .freeze(&FeatureToggles::new())
        .unwrap()
}

fn setup_ledger(store: Arc<dyn SnapshotStore>, policy: RetentionPolicy) -> SnapshotLedger {
    SnapshotLedger::new(store, SnapshotCodec::new(Arc::new(context()), true), policy)
}

fn snapshot(cause: SaveCause, age: ChronoDuration, food_level: i32) -> PackedSnapshot {
    UnpackedSnapshot::builder(&context())
        .save_cause(cause)
        .timestamp(now() - age)
        .feature(Food {
            food_level,
            saturation: 1.0,
            exhaustion: 0.0,
        })
        .build()
        .unwrap()
        .pack(&registry())
        .unwrap()
}

fn collapsing_policy() -> RetentionPolicy {
    RetentionPolicy {
        max_snapshots: 5,
        backup_frequency: Some(Duration::from_secs(4 * 60 * 60)),
        handoff_ttl: Duration::from_secs(10),
        auto_pin: vec![SaveCause::InventoryCommand],
    }
}

#[test]
fn test_add_snapshot_round_trips_through_codec() {
    let ledger = setup_ledger(Arc::new(SqliteStore::open_in_memory().unwrap()), RetentionPolicy::default());
    let user = UserId::random();
    let added = snapshot(SaveCause::Disconnect, ChronoDuration::zero(), 17);

    ledger.add_snapshot(user, "Steve", added.clone()).unwrap();

    let latest = ledger.latest(user).unwrap().unwrap();
    assert_eq!(latest, added);
    assert_eq!(ledger.latest_id(user).unwrap(), Some(added.id()));
    let food = latest.unpack(&registry()).unwrap();
    assert_eq!(food.feature::<Food>().unwrap().food_level, 17);
}

#[test]
fn test_auto_pin_cause_is_pinned() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), collapsing_policy());
    let user = UserId::random();

    let stored = ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::InventoryCommand, ChronoDuration::zero(), 1))
        .unwrap();
    assert!(stored.is_pinned());
    assert!(ledger.latest(user).unwrap().unwrap().is_pinned());
}

#[test]
fn test_save_inside_backup_window_replaces_latest() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), collapsing_policy());
    let user = UserId::random();
    let first = snapshot(SaveCause::WorldSave, ChronoDuration::minutes(20), 1);
    let second = snapshot(SaveCause::WorldSave, ChronoDuration::zero(), 2);

    ledger.add_snapshot(user, "Steve", first.clone()).unwrap();
    ledger.add_snapshot(user, "Steve", second.clone()).unwrap();

    let ids: Vec<_> = ledger.all(user).unwrap().iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec![second.id()]);
}

#[test]
fn test_save_right_after_handoff_keeps_previous() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), collapsing_policy());
    let user = UserId::random();
    let handed_off = snapshot(SaveCause::Disconnect, ChronoDuration::seconds(2), 1);
    let next = snapshot(SaveCause::WorldSave, ChronoDuration::zero(), 2);

    ledger.add_snapshot(user, "Steve", handed_off.clone()).unwrap();
    ledger.add_snapshot(user, "Steve", next).unwrap();

    assert_eq!(ledger.all(user).unwrap().len(), 2);
    assert!(ledger.get(user, handed_off.id()).unwrap().is_some());
}

#[test]
fn test_pinned_save_does_not_collapse_latest() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), collapsing_policy());
    let user = UserId::random();
    let world_save = snapshot(SaveCause::WorldSave, ChronoDuration::minutes(30), 1);

    ledger.add_snapshot(user, "Steve", world_save.clone()).unwrap();
    let pinned = ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::InventoryCommand, ChronoDuration::zero(), 2))
        .unwrap();

    assert!(pinned.is_pinned());
    assert_eq!(ledger.rows(user).unwrap().len(), 2);
    assert!(ledger.get(user, world_save.id()).unwrap().is_some());
}

#[test]
fn test_rejected_save_keeps_previous_snapshot() {
    for store in [
        Arc::new(MemoryStore::new()) as Arc<dyn SnapshotStore>,
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    ] {
        let ledger = setup_ledger(store, collapsing_policy());
        let user = UserId::random();
        let world_save = snapshot(SaveCause::WorldSave, ChronoDuration::minutes(30), 1);
        ledger.add_snapshot(user, "Steve", world_save.clone()).unwrap();

        let rejected = snapshot(SaveCause::Other("X".repeat(40)), ChronoDuration::zero(), 2);
        let err = ledger.add_snapshot(user, "Steve", rejected).unwrap_err();
        assert_eq!(err.kind(), SyncErrorKind::InvalidInput);

        let ids: Vec<_> = ledger.rows(user).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![world_save.id()]);
    }
}

#[test]
fn test_save_outside_backup_window_is_kept() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), collapsing_policy());
    let user = UserId::random();

    ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::WorldSave, ChronoDuration::hours(5), 1))
        .unwrap();
    ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::WorldSave, ChronoDuration::zero(), 2))
        .unwrap();

    assert_eq!(ledger.all(user).unwrap().len(), 2);
}

#[test]
fn test_rotation_runs_after_every_add() {
    let policy = RetentionPolicy {
        max_snapshots: 2,
        ..RetentionPolicy::default()
    };
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), policy);
    let user = UserId::random();
    for minutes in [40, 30, 20, 10] {
        ledger
            .add_snapshot(
                user,
                "Steve",
                snapshot(SaveCause::WorldSave, ChronoDuration::minutes(minutes), 1),
            )
            .unwrap();
    }
    assert_eq!(ledger.rows(user).unwrap().len(), 2);
}

#[test]
fn test_pin_and_unpin_rewrite_payload() {
    let ledger = setup_ledger(Arc::new(SqliteStore::open_in_memory().unwrap()), RetentionPolicy::default());
    let user = UserId::random();
    let added = ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::Death, ChronoDuration::zero(), 3))
        .unwrap();

    ledger.pin(user, added.id()).unwrap();
    let pinned = ledger.get(user, added.id()).unwrap().unwrap();
    assert!(pinned.is_pinned());
    assert!(ledger.rows(user).unwrap()[0].pinned);

    ledger.unpin(user, added.id()).unwrap();
    assert!(!ledger.get(user, added.id()).unwrap().unwrap().is_pinned());
}

#[test]
fn test_pin_missing_snapshot_is_not_found() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), RetentionPolicy::default());
    let user = UserId::random();
    ledger.ensure_user(user, "Steve").unwrap();

    let err = ledger.pin(user, Default::default()).unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::NotFound);
}

#[test]
fn test_restore_adds_copy_as_latest() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), RetentionPolicy::default());
    let user = UserId::random();
    let old = ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::Death, ChronoDuration::hours(1), 4))
        .unwrap();
    ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::WorldSave, ChronoDuration::zero(), 9))
        .unwrap();

    let restored = ledger.restore(user, old.id()).unwrap();

    assert_ne!(restored.id(), old.id());
    assert_eq!(restored.save_cause(), &SaveCause::BackupRestore);
    assert_eq!(restored.data(), old.data());
    assert_eq!(ledger.latest_id(user).unwrap(), Some(restored.id()));
    assert_eq!(ledger.rows(user).unwrap().len(), 3);
}

#[test]
fn test_resolve_by_short_id() {
    let ledger = setup_ledger(Arc::new(MemoryStore::new()), RetentionPolicy::default());
    let user = UserId::random();
    let added = ledger
        .add_snapshot(user, "Steve", snapshot(SaveCause::Api, ChronoDuration::zero(), 1))
        .unwrap();

    let row = ledger.resolve(user, &added.short_id()).unwrap().unwrap();
    assert_eq!(row.id, added.id());
    assert_eq!(ledger.find_user("steve").unwrap().unwrap().id, user);
}

#[test]
fn test_incompatible_stored_snapshot_surfaces_gate_error() {
    let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
    let user = UserId::random();

    let newer = FormatContext::new(HostVersion::new(1, 21, 0), "paper", "hub");
    let writer = SnapshotLedger::new(
        store.clone(),
        SnapshotCodec::new(Arc::new(newer.clone()), true),
        RetentionPolicy::default(),
    );
    let packed = UnpackedSnapshot::builder(&newer)
        .save_cause(SaveCause::Disconnect)
        .build()
        .unwrap()
        .pack(&registry())
        .unwrap();
    writer.add_snapshot(user, "Steve", packed).unwrap();

    let reader = setup_ledger(store, RetentionPolicy::default());
    let err = reader.latest(user).unwrap_err();
    assert_eq!(err.kind(), SyncErrorKind::InvalidHostVersion);
    assert_eq!(err.user_id(), Some(user));
    assert_eq!(reader.rows(user).unwrap().len(), 1);
}
