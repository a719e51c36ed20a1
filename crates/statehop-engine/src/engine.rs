//! The sync engine
//!
//! Coordinates sessions, the simulation thread, the handoff relay and the
//! snapshot ledger.
//!
//! ## Join
//!
//! 1. Consume the user's server-switch marker
//! 2. Marker present: poll the relay for the handed-off snapshot until the
//!    read timeout. On timeout, fall back to the store only if its latest
//!    snapshot is the one the marker names
//! 3. No marker: load the store's latest snapshot
//! 4. Apply once, on the simulation thread, then mark the session Active
//!
//! Any failure along the way locks the session instead of failing the join.
//!
//! ## Disconnect
//!
//! Live state is captured on the simulation thread, the marker is set, and
//! a spawned task publishes to the relay and writes the store concurrently.
//! The task runs to completion even if nobody awaits it; `shutdown` does.

use crate::errors::{
    handoff_timeout, internal, join_failed, no_session, session_locked, task_failed, Result,
};
use crate::executor::SimThread;
use crate::handoff::{HandoffChannel, MemoryHandoff, RedisHandoff};
use crate::session::{LoadSource, Session, SessionState, SharedOwner};
use futures::FutureExt;
use statehop_core::config::{HandoffBackend, Settings};
use statehop_core::errors::{SyncError, SyncErrorKind};
use statehop_core::registry::{FeatureToggles, RegistryBuilder};
use statehop_core::snapshot::SaveCause;
use statehop_core::{
    log_op_end, log_op_error, log_op_start, PackedSnapshot, SerializerRegistry, SnapshotCodec,
    UnpackedSnapshot,
};
use statehop_core_types::{SnapshotId, UserId};
use statehop_store::{RetentionPolicy, SnapshotLedger, SnapshotStore, SqliteStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

/// Timing knobs for one engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub server_name: String,
    /// Lifetime of relay entries
    pub handoff_ttl: Duration,
    /// Bounded wait for handed-off data on join
    pub read_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_name: "server".to_string(),
            handoff_ttl: Duration::from_secs(10),
            read_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            server_name: settings.server_name.clone(),
            handoff_ttl: settings.handoff.ttl(),
            read_timeout: settings.handoff.read_timeout(),
            poll_interval: settings.handoff.poll_interval(),
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Run a blocking store call off the async workers
async fn blocking<F, R>(op: &'static str, call: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| task_failed(op, e))?
}

type SaveTask = JoinHandle<Result<()>>;

fn save_outcome(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| task_failed("save", e)).and_then(|r| r)
}

/// Saves still running, and failures of finished ones nobody has seen yet
#[derive(Default)]
struct SaveTracker {
    running: Vec<SaveTask>,
    failed: Vec<SyncError>,
}

impl SaveTracker {
    /// Drop finished tasks, keeping their errors
    fn reap(&mut self) {
        let failed = &mut self.failed;
        self.running.retain_mut(|task| match task.now_or_never() {
            None => true,
            Some(joined) => {
                if let Err(e) = save_outcome(joined) {
                    failed.push(e);
                }
                false
            }
        });
    }
}

pub struct SyncEngine {
    config: EngineConfig,
    registry: RwLock<Arc<SerializerRegistry>>,
    ledger: SnapshotLedger,
    handoff: Arc<dyn HandoffChannel>,
    sim: SimThread,
    sessions: Mutex<HashMap<UserId, Session>>,
    user_locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
    saves: Mutex<SaveTracker>,
}

impl SyncEngine {
    /// # Errors
    ///
    /// `Internal` if the simulation thread cannot be started.
    pub fn new(
        config: EngineConfig,
        registry: SerializerRegistry,
        ledger: SnapshotLedger,
        handoff: Arc<dyn HandoffChannel>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            registry: RwLock::new(Arc::new(registry)),
            ledger,
            handoff,
            sim: SimThread::spawn()?,
            sessions: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            saves: Mutex::new(SaveTracker::default()),
        })
    }

    /// Wire an engine from settings: SQLite store, configured relay, and
    /// `registrations` frozen with the configured feature toggles
    ///
    /// # Errors
    ///
    /// Any registry, config, database or relay connection failure. These are
    /// startup errors and should stop the process.
    pub async fn from_settings(settings: &Settings, registrations: RegistryBuilder) -> Result<Self> {
        let registry = registrations
            .freeze(&settings.synchronization.features)
            .map_err(SyncError::from)?;
        let codec = SnapshotCodec::new(
            Arc::new(settings.format_context().map_err(SyncError::from)?),
            settings.synchronization.compress_data,
        );
        let policy = RetentionPolicy::from_settings(settings)?;

        let path = settings.database.path.clone();
        let store: Arc<dyn SnapshotStore> =
            Arc::new(blocking("open_database", move || SqliteStore::open(path)).await?);

        let handoff: Arc<dyn HandoffChannel> = match settings.handoff.backend {
            HandoffBackend::Memory => Arc::new(MemoryHandoff::new(&settings.cluster_id)),
            HandoffBackend::Redis => Arc::new(
                RedisHandoff::connect(settings.handoff.redis_url.expose(), &settings.cluster_id)
                    .await?,
            ),
        };

        tracing::info!(
            server = %settings.server_name,
            backend = ?settings.handoff.backend,
            "sync engine ready"
        );
        Self::new(
            EngineConfig::from_settings(settings),
            registry,
            SnapshotLedger::new(store, codec, policy),
            handoff,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SnapshotLedger {
        &self.ledger
    }

    /// The registry currently in force
    pub fn registry(&self) -> Result<Arc<SerializerRegistry>> {
        self.registry
            .read()
            .map(|r| r.clone())
            .map_err(|_| internal("registry", "registry lock poisoned"))
    }

    /// Re-apply feature toggles without restarting
    ///
    /// Sessions already loaded keep their state; the new toggles apply from
    /// the next capture or load.
    ///
    /// # Errors
    ///
    /// The registry's validation error; the current registry stays in force.
    pub fn reload_features(&self, toggles: &FeatureToggles) -> Result<()> {
        let reloaded = self.registry()?.reload(toggles).map_err(|e| {
            SyncError::from(e).with_op("reload_features")
        })?;
        let enabled = reloaded.enabled().count();
        *self
            .registry
            .write()
            .map_err(|_| internal("reload_features", "registry lock poisoned"))? = Arc::new(reloaded);
        tracing::info!(enabled, "feature toggles reloaded");
        Ok(())
    }

    pub fn session(&self, user_id: UserId) -> Option<Session> {
        self.sessions().ok()?.get(&user_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions().map(|s| s.len()).unwrap_or(0)
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<UserId, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| internal("sessions", "session table lock poisoned"))
    }

    fn user_lock(&self, user_id: UserId) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .user_locks
            .lock()
            .map_err(|_| internal("user_lock", "user lock table poisoned"))?;
        Ok(locks.entry(user_id).or_default().clone())
    }

    /// Forget a user's lock once nobody else holds or waits on it
    fn release_user_lock(&self, user_id: UserId, lock: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.user_locks.lock() {
            // The table's reference plus ours
            if Arc::strong_count(&lock) == 2 {
                locks.remove(&user_id);
            }
        }
    }

    /// Users with an entry in the per-user lock table
    pub fn user_lock_count(&self) -> usize {
        self.user_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    /// Load a user's data and bring their session up
    ///
    /// Returns the session in `Active` or `Locked` state.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the user already has a session here.
    pub async fn join(&self, user_id: UserId, username: &str, owner: SharedOwner) -> Result<Session> {
        log_op_start!("join", user_id = %user_id, username = username);
        let start = Instant::now();

        let lock = self.user_lock(user_id)?;
        let _guard = lock.lock().await;

        {
            let mut sessions = self.sessions()?;
            if sessions.contains_key(&user_id) {
                let err = SyncError::new(SyncErrorKind::AlreadyExists)
                    .with_op("join")
                    .with_user_id(user_id)
                    .with_message("user already has a session on this server");
                log_op_error!("join", err.clone(), duration_ms = elapsed_ms(start));
                return Err(err);
            }
            sessions.insert(user_id, Session::joining(user_id, username, owner.clone()));
        }

        let marker = self.take_marker(user_id).await;
        let session = self.load_session(user_id, username, owner, marker).await?;

        log_op_end!(
            "join",
            duration_ms = elapsed_ms(start),
            user_id = %user_id,
            state = session.state().as_str(),
            source = ?session.loaded_from()
        );
        Ok(session)
    }

    /// Re-run the load for a locked session
    ///
    /// # Errors
    ///
    /// `NotFound` without a session, `InvalidInput` if it is not locked.
    pub async fn retry(&self, user_id: UserId) -> Result<Session> {
        log_op_start!("retry", user_id = %user_id);
        let start = Instant::now();

        let lock = self.user_lock(user_id)?;
        let _guard = lock.lock().await;

        let current = self
            .session(user_id)
            .ok_or_else(|| no_session("retry", user_id))?;
        if !current.state().is_locked() {
            return Err(SyncError::new(SyncErrorKind::InvalidInput)
                .with_op("retry")
                .with_user_id(user_id)
                .with_message(format!("session is {}, not locked", current.state().as_str())));
        }

        // A newer marker supersedes the one consumed on join
        let marker = self
            .take_marker(user_id)
            .await
            .or(current.expected_snapshot());
        let session = self
            .load_session(user_id, current.username(), current.owner().clone(), marker)
            .await?;

        log_op_end!(
            "retry",
            duration_ms = elapsed_ms(start),
            user_id = %user_id,
            state = session.state().as_str()
        );
        Ok(session)
    }

    async fn take_marker(&self, user_id: UserId) -> Option<SnapshotId> {
        match self.handoff.take_server_switch(user_id).await {
            Ok(marker) => marker,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "server switch marker unreadable");
                None
            }
        }
    }

    /// Load, apply and record the outcome on the session
    async fn load_session(
        &self,
        user_id: UserId,
        username: &str,
        owner: SharedOwner,
        marker: Option<SnapshotId>,
    ) -> Result<Session> {
        let outcome = self.load_and_apply(user_id, username, owner, marker).await;

        let mut sessions = self.sessions()?;
        let session = sessions
            .get_mut(&user_id)
            .ok_or_else(|| no_session("join", user_id))?;
        match outcome {
            Ok(source) => session.activate(source),
            Err(err) => {
                tracing::warn!(
                    user_id = %user_id,
                    err.code = err.code(),
                    error = %err,
                    "session locked"
                );
                session.set_expected_snapshot(marker);
                session.lock(err);
            }
        }
        Ok(session.clone())
    }

    async fn load_and_apply(
        &self,
        user_id: UserId,
        username: &str,
        owner: SharedOwner,
        marker: Option<SnapshotId>,
    ) -> Result<LoadSource> {
        let (snapshot, source) = match marker {
            Some(expected) => self.load_handed_off(user_id, expected).await?,
            None => {
                let ledger = self.ledger.clone();
                let latest = blocking("get_latest_snapshot", move || ledger.latest(user_id)).await?;
                let source = if latest.is_some() {
                    LoadSource::Store
                } else {
                    LoadSource::Fresh
                };
                (latest, source)
            }
        };

        let ledger = self.ledger.clone();
        let name = username.to_string();
        blocking("ensure_identity", move || ledger.ensure_user(user_id, &name)).await?;

        if let Some(snapshot) = snapshot {
            self.apply(user_id, &snapshot, owner).await?;
        }
        Ok(source)
    }

    /// Resolve the snapshot a server-switch marker points at
    async fn load_handed_off(
        &self,
        user_id: UserId,
        expected: SnapshotId,
    ) -> Result<(Option<PackedSnapshot>, LoadSource)> {
        let relay_error = match self.await_handoff(user_id).await {
            Ok(Some(bytes)) => {
                let snapshot = self
                    .ledger
                    .codec()
                    .decode(&bytes)
                    .map_err(|e| SyncError::from(e).with_user_id(user_id))?;
                if snapshot.id() != expected {
                    tracing::debug!(
                        user_id = %user_id,
                        expected = %expected.short(),
                        received = %snapshot.short_id(),
                        "handed-off snapshot differs from marker"
                    );
                }
                return Ok((Some(snapshot), LoadSource::Handoff));
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };

        let ledger = self.ledger.clone();
        let latest_id = blocking("get_latest_snapshot", move || ledger.latest_id(user_id))
            .await
            .map_err(|store_err| match &relay_error {
                Some(relay_err) => {
                    tracing::warn!(user_id = %user_id, error = %relay_err, "handoff relay unreadable");
                    join_failed(user_id, store_err)
                }
                None => store_err,
            })?;

        if latest_id != Some(expected) {
            return Err(match relay_error {
                Some(relay_err) => relay_err.with_user_id(user_id),
                None => handoff_timeout(user_id, self.config.read_timeout),
            });
        }

        tracing::debug!(
            user_id = %user_id,
            snapshot_id = %expected.short(),
            "relay timed out; store already holds the handed-off snapshot"
        );
        let ledger = self.ledger.clone();
        let latest = blocking("get_latest_snapshot", move || ledger.latest(user_id)).await?;
        Ok((latest, LoadSource::Store))
    }

    async fn await_handoff(&self, user_id: UserId) -> Result<Option<Vec<u8>>> {
        let deadline = tokio::time::Instant::now() + self.config.read_timeout;
        loop {
            if let Some(bytes) = self.handoff.take_data_update(user_id).await? {
                return Ok(Some(bytes));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn apply(&self, user_id: UserId, snapshot: &PackedSnapshot, owner: SharedOwner) -> Result<()> {
        let registry = self.registry()?;
        let unpacked = snapshot.unpack(&registry).map_err(|e| {
            SyncError::from(e)
                .with_user_id(user_id)
                .with_snapshot_id(snapshot.id())
        })?;
        let snapshot_id = snapshot.id();
        self.sim
            .run(move || {
                let mut owner = owner
                    .lock()
                    .map_err(|_| internal("apply", "data owner lock poisoned"))?;
                unpacked
                    .apply_to(&registry, &mut *owner)
                    .map_err(SyncError::from)
            })
            .await?
            .map_err(|e| e.with_op("apply").with_user_id(user_id).with_snapshot_id(snapshot_id))?;
        tracing::debug!(user_id = %user_id, snapshot_id = %snapshot_id.short(), "snapshot applied");
        Ok(())
    }

    /// Read live state on the simulation thread and pack it
    async fn capture(&self, session: &Session, cause: SaveCause) -> Result<PackedSnapshot> {
        let registry = self.registry()?;
        let ctx = self.ledger.codec().context().clone();
        let owner = session.owner().clone();
        let capture_registry = registry.clone();
        let unpacked = self
            .sim
            .run(move || {
                let owner = owner
                    .lock()
                    .map_err(|_| internal("capture", "data owner lock poisoned"))?;
                UnpackedSnapshot::capture(&ctx, &capture_registry, &*owner, cause)
                    .map_err(SyncError::from)
            })
            .await??;
        unpacked
            .pack(&registry)
            .map_err(|e| SyncError::from(e).with_snapshot_id(unpacked.id()))
    }

    /// Save and hand off a leaving user's state
    ///
    /// Returns once the server-switch marker is set; the relay publish and
    /// the store write continue in the background. Locked sessions are
    /// dropped without saving and return `None`.
    ///
    /// # Errors
    ///
    /// `NotFound` without a session, or a capture/pack failure.
    pub async fn save_on_disconnect(&self, user_id: UserId) -> Result<Option<SnapshotId>> {
        log_op_start!("save_on_disconnect", user_id = %user_id);
        let start = Instant::now();

        let lock = self.user_lock(user_id)?;
        let result = {
            let _guard = lock.lock().await;
            self.disconnect(user_id, start).await
        };
        self.release_user_lock(user_id, lock);
        result
    }

    async fn disconnect(&self, user_id: UserId, start: Instant) -> Result<Option<SnapshotId>> {
        let mut session = self
            .sessions()?
            .remove(&user_id)
            .ok_or_else(|| no_session("save_on_disconnect", user_id))?;
        if let SessionState::Locked(err) = session.state() {
            tracing::warn!(
                user_id = %user_id,
                err.code = err.code(),
                "locked session left; nothing saved"
            );
            log_op_end!("save_on_disconnect", duration_ms = elapsed_ms(start), saved = false);
            return Ok(None);
        }
        session.leave();

        let snapshot = self
            .capture(&session, SaveCause::Disconnect)
            .await
            .map_err(|e| {
                let e = e.with_user_id(user_id);
                log_op_error!("save_on_disconnect", e.clone(), duration_ms = elapsed_ms(start));
                e
            })?;
        let snapshot_id = snapshot.id();

        if let Err(e) = self
            .handoff
            .set_server_switch(user_id, snapshot_id, self.config.handoff_ttl)
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "could not set server switch marker");
        }

        let task = tokio::spawn(publish_and_store(
            self.ledger.clone(),
            self.handoff.clone(),
            self.config.handoff_ttl,
            user_id,
            session.username().to_string(),
            snapshot,
        ));
        self.track(task)?;

        log_op_end!(
            "save_on_disconnect",
            duration_ms = elapsed_ms(start),
            user_id = %user_id,
            snapshot_id = %snapshot_id.short()
        );
        Ok(Some(snapshot_id))
    }

    /// Snapshot an active session to the store
    ///
    /// The write runs in a spawned task, so it completes even if this future
    /// is dropped.
    ///
    /// # Errors
    ///
    /// `SessionLocked` for a locked session, or the first capture or store
    /// failure.
    pub async fn save(&self, user_id: UserId, cause: SaveCause) -> Result<SnapshotId> {
        log_op_start!("save", user_id = %user_id, cause = cause.as_str());
        let start = Instant::now();

        let result = self.save_impl(user_id, cause).await.map_err(|e| {
            log_op_error!("save", e.clone(), duration_ms = elapsed_ms(start));
            e
        })?;

        log_op_end!("save", duration_ms = elapsed_ms(start), snapshot_id = %result.short());
        Ok(result)
    }

    async fn save_impl(&self, user_id: UserId, cause: SaveCause) -> Result<SnapshotId> {
        let session = self
            .session(user_id)
            .ok_or_else(|| no_session("save", user_id))?;
        match session.state() {
            SessionState::Active => {}
            SessionState::Locked(err) => return Err(session_locked("save", user_id, err)),
            other => {
                return Err(SyncError::new(SyncErrorKind::InvalidInput)
                    .with_op("save")
                    .with_user_id(user_id)
                    .with_message(format!("session is {}", other.as_str())))
            }
        }

        let snapshot = self.capture(&session, cause).await?;
        let snapshot_id = snapshot.id();
        let (tx, rx) = oneshot::channel();
        let ledger = self.ledger.clone();
        let username = session.username().to_string();
        // The tracker only keeps the result if the caller stopped waiting
        let task = tokio::spawn(async move {
            let result = blocking("add_snapshot", move || {
                ledger.add_snapshot(user_id, &username, snapshot).map(|_| ())
            })
            .await;
            match tx.send(result) {
                Ok(()) => Ok(()),
                Err(undelivered) => undelivered,
            }
        });
        self.track(task)?;

        rx.await
            .map_err(|_| internal("save", "save task ended without a result"))??;
        Ok(snapshot_id)
    }

    fn track(&self, task: SaveTask) -> Result<()> {
        let mut saves = self
            .saves
            .lock()
            .map_err(|_| internal("track_save", "save list lock poisoned"))?;
        saves.reap();
        saves.running.push(task);
        Ok(())
    }

    /// Await every in-flight save
    ///
    /// Failures of background saves that finished earlier are reported here
    /// too, once.
    ///
    /// # Errors
    ///
    /// The first failure among the saves; all are awaited regardless.
    pub async fn wait_for_saves(&self) -> Result<()> {
        let (pending, mut failures) = {
            let mut saves = self
                .saves
                .lock()
                .map_err(|_| internal("wait_for_saves", "save list lock poisoned"))?;
            (
                std::mem::take(&mut saves.running),
                std::mem::take(&mut saves.failed),
            )
        };

        for joined in futures::future::join_all(pending).await {
            if let Err(e) = save_outcome(joined) {
                failures.push(e);
            }
        }
        if failures.len() > 1 {
            tracing::warn!(failed = failures.len(), "several background saves failed");
        }
        match failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Number of saves that have not finished yet
    pub fn pending_saves(&self) -> usize {
        self.saves
            .lock()
            .map(|mut saves| {
                saves.reap();
                saves.running.len()
            })
            .unwrap_or(0)
    }

    /// Save every active session, await all saves and stop the simulation
    /// thread
    ///
    /// # Errors
    ///
    /// The first save failure. Every session is still attempted.
    pub async fn shutdown(&self) -> Result<()> {
        log_op_start!("shutdown");
        let start = Instant::now();

        let users: Vec<UserId> = self
            .sessions()?
            .values()
            .filter(|s| s.state().is_active())
            .map(Session::user_id)
            .collect();

        let mut first_error = None;
        for user_id in users {
            if let Err(e) = self.save(user_id, SaveCause::ServerShutdown).await {
                first_error.get_or_insert(e);
            }
        }
        self.sessions()?.clear();

        if let Err(e) = self.wait_for_saves().await {
            first_error.get_or_insert(e);
        }
        self.sim.stop();

        match first_error {
            Some(e) => {
                log_op_error!("shutdown", e.clone(), duration_ms = elapsed_ms(start));
                Err(e)
            }
            None => {
                log_op_end!("shutdown", duration_ms = elapsed_ms(start));
                Ok(())
            }
        }
    }
}

/// Publish to the relay and write the store at the same time
///
/// A relay failure only costs the fast path; the store result decides the
/// outcome.
async fn publish_and_store(
    ledger: SnapshotLedger,
    handoff: Arc<dyn HandoffChannel>,
    ttl: Duration,
    user_id: UserId,
    username: String,
    snapshot: PackedSnapshot,
) -> Result<()> {
    let payload = ledger.encode(&snapshot)?;
    let store_ledger = ledger.clone();
    let (published, stored) = tokio::join!(
        handoff.set_data_update(user_id, payload, ttl),
        blocking("add_snapshot", move || {
            store_ledger.add_snapshot(user_id, &username, snapshot)
        }),
    );

    if let Err(e) = published {
        tracing::warn!(user_id = %user_id, error = %e, "handoff publish failed");
    }
    match stored {
        Ok(snapshot) => {
            tracing::debug!(
                user_id = %user_id,
                snapshot_id = %snapshot.short_id(),
                "disconnect snapshot stored"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, err.code = e.code(), error = %e, "disconnect save failed");
            Err(e)
        }
    }
}
