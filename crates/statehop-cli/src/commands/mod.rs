//! Command implementations and the shared database handle

pub mod config;
pub mod db;
pub mod snapshot;
pub mod user;

use anyhow::{anyhow, Context};
use statehop_core::config::Settings;
use statehop_core::registry::RegistryBuilder;
use statehop_core::{SerializerRegistry, SnapshotCodec};
use statehop_store::{RetentionPolicy, SnapshotLedger, SnapshotRow, SnapshotStore, SqliteStore, StoredUser};
use std::path::PathBuf;
use std::sync::Arc;

/// Flags shared by every subcommand
pub struct Globals {
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
}

/// An opened snapshot database
pub struct Workspace {
    pub registry: SerializerRegistry,
    pub ledger: SnapshotLedger,
}

impl Globals {
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref()).context("loading settings")?;
        if let Some(db) = &self.db {
            settings.database.path = db.to_string_lossy().into_owned();
        }
        Ok(settings)
    }

    pub fn open(&self) -> anyhow::Result<Workspace> {
        let settings = self.settings()?;
        let registry = RegistryBuilder::with_builtins()
            .freeze(&settings.synchronization.features)
            .context("building serializer registry")?;
        let codec = SnapshotCodec::new(
            Arc::new(settings.format_context()?),
            settings.synchronization.compress_data,
        );
        let store: Arc<dyn SnapshotStore> = Arc::new(
            SqliteStore::open(&settings.database.path)
                .with_context(|| format!("opening {}", settings.database.path))?,
        );
        tracing::debug!(path = %settings.database.path, "snapshot database opened");
        Ok(Workspace {
            registry,
            ledger: SnapshotLedger::new(store, codec, RetentionPolicy::from_settings(&settings)?),
        })
    }
}

impl Workspace {
    /// Find a user by UUID or (case-insensitive) name
    pub fn user(&self, name_or_id: &str) -> anyhow::Result<StoredUser> {
        self.ledger
            .find_user(name_or_id)?
            .ok_or_else(|| anyhow!("no user '{}'", name_or_id))
    }

    /// Find a snapshot by full id or short id prefix
    pub fn snapshot(&self, user: &StoredUser, id_or_prefix: &str) -> anyhow::Result<SnapshotRow> {
        self.ledger
            .resolve(user.id, id_or_prefix)?
            .ok_or_else(|| anyhow!("{} has no snapshot '{}'", user.username, id_or_prefix))
    }
}
