use statehop_core::data::{
    Advancements, CustomData, EnderChest, Experience, Food, GameMode, Health, Inventory,
    Location, PersistentData, PotionEffects, Statistics,
};
use statehop_core::identifier::BuiltinFeature;
use statehop_core::registry::{FeatureToggles, RegistryBuilder};
use statehop_core::snapshot::{FormatContext, HostVersion, SaveCause};
use statehop_core::{
    DataContainer, DataOwner, Identifier, PackedSnapshot, Result, SerializerRegistry,
    SnapshotCodec, SnapshotError, UnpackedSnapshot,
};
use async_trait::async_trait;
use statehop_core::errors::{SyncError, SyncErrorKind};
use statehop_core_types::{SnapshotId, UserId};
use statehop_engine::{
    EngineConfig, HandoffChannel, MemoryHandoff, SharedOwner, SimThread, SyncEngine,
};
use statehop_store::{
    CollapseWindow, Insertion, MemoryStore, RetentionPolicy, SnapshotLedger, SnapshotRow,
    SnapshotStore, StoredUser,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[allow(dead_code)]
pub fn registry() -> SerializerRegistry {
    RegistryBuilder::with_builtins()
        .freeze(&FeatureToggles::new())
        .unwrap()
}

#[allow(dead_code)]
pub fn context(server: &str, host: HostVersion) -> FormatContext {
    FormatContext::new(host, "paper", server)
}

#[allow(dead_code)]
pub fn fast_config(server: &str) -> EngineConfig {
    EngineConfig {
        server_name: server.to_string(),
        handoff_ttl: Duration::from_secs(5),
        read_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
    }
}

#[allow(dead_code)]
pub fn health(value: f64) -> DataContainer {
    DataContainer::Health(Health {
        health: value,
        health_scale: 20.0,
        health_scaled: false,
    })
}

/// A packed snapshot holding only a health value
#[allow(dead_code)]
pub fn health_snapshot(ctx: &FormatContext, value: f64) -> PackedSnapshot {
    UnpackedSnapshot::builder(ctx)
        .save_cause(SaveCause::WorldSave)
        .data(BuiltinFeature::Health.identifier(), health(value))
        .build()
        .unwrap()
        .pack(&registry())
        .unwrap()
}

/// Processes of one network: a shared store and a shared relay
pub struct Cluster {
    pub store: Arc<MemoryStore>,
    pub relay: Arc<MemoryHandoff>,
}

#[allow(dead_code)]
impl Cluster {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            relay: Arc::new(MemoryHandoff::new("test")),
        }
    }

    pub fn ledger(&self, ctx: FormatContext) -> SnapshotLedger {
        let store: Arc<dyn SnapshotStore> = self.store.clone();
        SnapshotLedger::new(
            store,
            SnapshotCodec::new(Arc::new(ctx), true),
            RetentionPolicy::default(),
        )
    }

    pub fn engine(&self, server: &str) -> SyncEngine {
        self.engine_on(server, HostVersion::new(1, 20, 4))
    }

    pub fn engine_on(&self, server: &str, host: HostVersion) -> SyncEngine {
        SyncEngine::new(
            fast_config(server),
            registry(),
            self.ledger(context(server, host)),
            self.relay.clone(),
        )
        .unwrap()
    }
}

/// Engine over an arbitrary store and relay
#[allow(dead_code)]
pub fn engine_with(
    server: &str,
    store: Arc<dyn SnapshotStore>,
    relay: Arc<dyn HandoffChannel>,
) -> SyncEngine {
    let ledger = SnapshotLedger::new(
        store,
        SnapshotCodec::new(Arc::new(context(server, HostVersion::new(1, 20, 4))), true),
        RetentionPolicy::default(),
    );
    SyncEngine::new(fast_config(server), registry(), ledger, relay).unwrap()
}

/// Memory store that refuses snapshot writes for chosen users
#[allow(dead_code)]
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    refused: Mutex<HashSet<UserId>>,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn refuse_writes_for(&self, user_id: UserId) {
        self.refused.lock().unwrap().insert(user_id);
    }

    fn check(&self, user_id: UserId) -> statehop_store::Result<()> {
        if self.refused.lock().unwrap().contains(&user_id) {
            return Err(SyncError::new(SyncErrorKind::Persistence)
                .with_op("create_snapshot")
                .with_user_id(user_id)
                .with_message("disk full"));
        }
        Ok(())
    }
}

impl SnapshotStore for FlakyStore {
    fn ensure_identity(&self, user: &StoredUser) -> statehop_store::Result<()> {
        self.inner.ensure_identity(user)
    }

    fn get_user(&self, user_id: UserId) -> statehop_store::Result<Option<StoredUser>> {
        self.inner.get_user(user_id)
    }

    fn get_user_by_name(&self, username: &str) -> statehop_store::Result<Option<StoredUser>> {
        self.inner.get_user_by_name(username)
    }

    fn get_all_users(&self) -> statehop_store::Result<Vec<StoredUser>> {
        self.inner.get_all_users()
    }

    fn create_snapshot(&self, row: &SnapshotRow) -> statehop_store::Result<()> {
        self.check(row.user_id)?;
        self.inner.create_snapshot(row)
    }

    fn get_latest_snapshot(&self, user_id: UserId) -> statehop_store::Result<Option<SnapshotRow>> {
        self.inner.get_latest_snapshot(user_id)
    }

    fn get_all_snapshots(&self, user_id: UserId) -> statehop_store::Result<Vec<SnapshotRow>> {
        self.inner.get_all_snapshots(user_id)
    }

    fn get_snapshot(
        &self,
        user_id: UserId,
        id: SnapshotId,
    ) -> statehop_store::Result<Option<SnapshotRow>> {
        self.inner.get_snapshot(user_id, id)
    }

    fn update_snapshot(&self, row: &SnapshotRow) -> statehop_store::Result<()> {
        self.inner.update_snapshot(row)
    }

    fn delete_snapshot(&self, user_id: UserId, id: SnapshotId) -> statehop_store::Result<bool> {
        self.inner.delete_snapshot(user_id, id)
    }

    fn rotate_snapshots(&self, user_id: UserId, max: usize) -> statehop_store::Result<usize> {
        self.inner.rotate_snapshots(user_id, max)
    }

    fn rotate_latest_snapshot(
        &self,
        user_id: UserId,
        window: &CollapseWindow,
    ) -> statehop_store::Result<Option<SnapshotId>> {
        self.inner.rotate_latest_snapshot(user_id, window)
    }

    fn insert_snapshot(
        &self,
        row: &SnapshotRow,
        collapse: Option<&CollapseWindow>,
        max: usize,
    ) -> statehop_store::Result<Insertion> {
        self.check(row.user_id)?;
        self.inner.insert_snapshot(row, collapse, max)
    }

    fn wipe_database(&self) -> statehop_store::Result<()> {
        self.inner.wipe_database()
    }
}

/// Relay that takes markers but drops every published snapshot
#[allow(dead_code)]
pub struct LossyRelay {
    markers: MemoryHandoff,
}

#[allow(dead_code)]
impl LossyRelay {
    pub fn new() -> Self {
        Self {
            markers: MemoryHandoff::new("test"),
        }
    }
}

#[async_trait]
impl HandoffChannel for LossyRelay {
    async fn set_server_switch(
        &self,
        user_id: UserId,
        snapshot_id: SnapshotId,
        ttl: Duration,
    ) -> statehop_engine::Result<()> {
        self.markers.set_server_switch(user_id, snapshot_id, ttl).await
    }

    async fn take_server_switch(&self, user_id: UserId) -> statehop_engine::Result<Option<SnapshotId>> {
        self.markers.take_server_switch(user_id).await
    }

    async fn set_data_update(
        &self,
        user_id: UserId,
        _payload: Vec<u8>,
        _ttl: Duration,
    ) -> statehop_engine::Result<()> {
        Err(SyncError::new(SyncErrorKind::Handoff)
            .with_op("set_data_update")
            .with_user_id(user_id)
            .with_message("relay unreachable"))
    }

    async fn take_data_update(&self, _user_id: UserId) -> statehop_engine::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Data owner backed by a map; records each apply and where it ran
#[derive(Default)]
pub struct TestOwner {
    pub live: BTreeMap<Identifier, DataContainer>,
    pub applied: Vec<String>,
    pub applied_off_sim_thread: usize,
    pub fail_on: Option<String>,
}

#[allow(dead_code)]
impl TestOwner {
    pub fn with_health(value: f64) -> Self {
        let mut owner = Self::default();
        owner
            .live
            .insert(BuiltinFeature::Health.identifier(), health(value));
        owner
    }

    pub fn shared(self) -> (Arc<Mutex<TestOwner>>, SharedOwner) {
        let owner = Arc::new(Mutex::new(self));
        let shared: SharedOwner = owner.clone();
        (owner, shared)
    }

    pub fn health(&self) -> Option<f64> {
        match self.live.get(&BuiltinFeature::Health.identifier()) {
            Some(DataContainer::Health(h)) => Some(h.health),
            _ => None,
        }
    }

    fn record(&mut self, identifier: Identifier, container: DataContainer) -> Result<()> {
        let key = identifier.as_key();
        if self.fail_on.as_deref() == Some(key.as_str()) {
            return Err(SnapshotError::Owner {
                identifier: key,
                reason: "refused".to_string(),
            });
        }
        if !SimThread::is_current() {
            self.applied_off_sim_thread += 1;
        }
        self.applied.push(key);
        self.live.insert(identifier, container);
        Ok(())
    }
}

impl DataOwner for TestOwner {
    fn produce(&self, identifier: &Identifier) -> Result<Option<DataContainer>> {
        Ok(self.live.get(identifier).cloned())
    }

    fn apply_inventory(&mut self, data: &Inventory) -> Result<()> {
        self.record(BuiltinFeature::Inventory.identifier(), DataContainer::Inventory(data.clone()))
    }

    fn apply_ender_chest(&mut self, data: &EnderChest) -> Result<()> {
        self.record(BuiltinFeature::EnderChest.identifier(), DataContainer::EnderChest(data.clone()))
    }

    fn apply_potion_effects(&mut self, data: &PotionEffects) -> Result<()> {
        self.record(
            BuiltinFeature::PotionEffects.identifier(),
            DataContainer::PotionEffects(data.clone()),
        )
    }

    fn apply_advancements(&mut self, data: &Advancements) -> Result<()> {
        self.record(
            BuiltinFeature::Advancements.identifier(),
            DataContainer::Advancements(data.clone()),
        )
    }

    fn apply_location(&mut self, data: &Location) -> Result<()> {
        self.record(BuiltinFeature::Location.identifier(), DataContainer::Location(data.clone()))
    }

    fn apply_statistics(&mut self, data: &Statistics) -> Result<()> {
        self.record(BuiltinFeature::Statistics.identifier(), DataContainer::Statistics(data.clone()))
    }

    fn apply_health(&mut self, data: &Health) -> Result<()> {
        self.record(BuiltinFeature::Health.identifier(), DataContainer::Health(data.clone()))
    }

    fn apply_food(&mut self, data: &Food) -> Result<()> {
        self.record(BuiltinFeature::Food.identifier(), DataContainer::Food(data.clone()))
    }

    fn apply_experience(&mut self, data: &Experience) -> Result<()> {
        self.record(BuiltinFeature::Experience.identifier(), DataContainer::Experience(data.clone()))
    }

    fn apply_game_mode(&mut self, data: &GameMode) -> Result<()> {
        self.record(BuiltinFeature::GameMode.identifier(), DataContainer::GameMode(data.clone()))
    }

    fn apply_persistent_data(&mut self, data: &PersistentData) -> Result<()> {
        self.record(
            BuiltinFeature::PersistentData.identifier(),
            DataContainer::PersistentData(data.clone()),
        )
    }

    fn apply_custom(&mut self, identifier: &Identifier, data: &CustomData) -> Result<()> {
        self.record(identifier.clone(), DataContainer::Custom(data.clone()))
    }
}
