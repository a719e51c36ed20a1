//! Process settings
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `STATEHOP__SECTION__FIELD` environment variables. Everything is read once
//! at startup and validated; an invalid file is fatal.

use crate::errors::{Result, SnapshotError};
use crate::registry::FeatureToggles;
use crate::snapshot::{FormatContext, HostVersion, SaveCause};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use statehop_core_types::Sensitive;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "STATEHOP";

/// Floor for the derived handoff read timeout
const MIN_READ_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Shared by every process in one network; namespaces handoff keys
    pub cluster_id: String,
    pub server_name: String,
    pub platform_type: String,
    pub host_version: String,
    pub database: DatabaseSettings,
    pub handoff: HandoffSettings,
    pub synchronization: SynchronizationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_id: String::new(),
            server_name: "server".to_string(),
            platform_type: "paper".to_string(),
            host_version: "1.20.4".to_string(),
            database: DatabaseSettings::default(),
            handoff: HandoffSettings::default(),
            synchronization: SynchronizationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: ".statehop/snapshots.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffBackend {
    /// Single-process relay, for tests and one-server setups
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    pub backend: HandoffBackend,
    pub redis_url: Sensitive<String>,
    /// Expected time for a user to hop between processes
    pub network_latency_ms: u64,
    /// Lifetime of handoff entries
    pub ttl_ms: u64,
    /// Bounded wait on join; derived from the latency when unset
    pub read_timeout_ms: Option<u64>,
    pub poll_interval_ms: u64,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            backend: HandoffBackend::Memory,
            redis_url: Sensitive::new("redis://127.0.0.1:6379".to_string()),
            network_latency_ms: 500,
            ttl_ms: 10_000,
            read_timeout_ms: None,
            poll_interval_ms: 10,
        }
    }
}

impl HandoffSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        let ms = self
            .read_timeout_ms
            .unwrap_or(self.network_latency_ms.saturating_mul(4))
            .max(MIN_READ_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynchronizationSettings {
    pub max_user_data_snapshots: usize,
    /// Minimum spacing between kept unpinned snapshots; 0 disables collapsing
    pub snapshot_backup_frequency_secs: u64,
    pub compress_data: bool,
    /// Save causes whose snapshots are pinned on creation
    pub auto_pin_causes: Vec<String>,
    /// Feature enable/disable overrides
    pub features: FeatureToggles,
}

impl Default for SynchronizationSettings {
    fn default() -> Self {
        Self {
            max_user_data_snapshots: 5,
            snapshot_backup_frequency_secs: 4 * 60 * 60,
            compress_data: true,
            auto_pin_causes: vec![
                SaveCause::InventoryCommand.as_str().to_string(),
                SaveCause::EnderchestCommand.as_str().to_string(),
                SaveCause::BackupRestore.as_str().to_string(),
                SaveCause::MpdbMigration.as_str().to_string(),
                SaveCause::LegacyMigration.as_str().to_string(),
                SaveCause::ConvertedFromV2.as_str().to_string(),
            ],
            features: FeatureToggles::new(),
        }
    }
}

impl SynchronizationSettings {
    /// Collapse window, or `None` when collapsing is disabled
    pub fn backup_frequency(&self) -> Option<Duration> {
        (self.snapshot_backup_frequency_secs > 0)
            .then(|| Duration::from_secs(self.snapshot_backup_frequency_secs))
    }

    pub fn auto_pin_causes(&self) -> Result<Vec<SaveCause>> {
        self.auto_pin_causes.iter().map(|c| c.parse()).collect()
    }
}

impl Settings {
    /// Load defaults, then `path` if given, then the environment
    ///
    /// # Errors
    ///
    /// `Config` when the file is unreadable, a value has the wrong type, or
    /// [`Settings::validate`] fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&Settings::default()).map_err(config_error)?;
        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error)?;
        settings.validate()?;
        tracing::debug!(server = %settings.server_name, "settings loaded");
        Ok(settings)
    }

    /// # Errors
    ///
    /// `Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.synchronization.max_user_data_snapshots == 0 {
            return Err(invalid("synchronization.max_user_data_snapshots must be at least 1"));
        }
        if self.handoff.poll_interval_ms == 0 {
            return Err(invalid("handoff.poll_interval_ms must be positive"));
        }
        if self.handoff.ttl() <= self.handoff.read_timeout() {
            return Err(invalid("handoff.ttl_ms must exceed the handoff read timeout"));
        }
        self.host_version()?;
        self.synchronization.auto_pin_causes()?;
        Ok(())
    }

    pub fn host_version(&self) -> Result<HostVersion> {
        self.host_version
            .parse()
            .map_err(|_| invalid(format!("host_version '{}' is not a.b[.c]", self.host_version)))
    }

    /// Format context stamped on every snapshot this process writes
    pub fn format_context(&self) -> Result<FormatContext> {
        Ok(FormatContext::new(
            self.host_version()?,
            self.platform_type.clone(),
            self.server_name.clone(),
        ))
    }

    /// Default settings rendered as TOML
    pub fn default_toml() -> Result<String> {
        toml::to_string_pretty(&Settings::default()).map_err(|e| SnapshotError::Config {
            message: e.to_string(),
        })
    }
}

fn config_error(err: config::ConfigError) -> SnapshotError {
    SnapshotError::Config {
        message: err.to_string(),
    }
}

fn invalid(message: impl Into<String>) -> SnapshotError {
    SnapshotError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.handoff.read_timeout(), Duration::from_millis(2000));
        assert_eq!(
            settings.synchronization.backup_frequency(),
            Some(Duration::from_secs(14_400))
        );
    }

    #[test]
    fn test_read_timeout_floor() {
        let handoff = HandoffSettings {
            network_latency_ms: 50,
            ..HandoffSettings::default()
        };
        assert_eq!(handoff.read_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_ttl_must_exceed_read_timeout() {
        let mut settings = Settings::default();
        settings.handoff.ttl_ms = 1000;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SnapshotError::Config { .. }));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server_name = \"survival-2\"\n\n[synchronization]\nmax_user_data_snapshots = 9\n\n[synchronization.features]\nlocation = true"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.server_name, "survival-2");
        assert_eq!(settings.synchronization.max_user_data_snapshots, 9);
        assert_eq!(settings.synchronization.features.get("location"), Some(&true));
        assert!(settings.synchronization.compress_data);
    }

    #[test]
    fn test_default_toml_round_trips() {
        let text = Settings::default_toml().unwrap();
        let parsed: Settings = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Settings::default());
    }
}
