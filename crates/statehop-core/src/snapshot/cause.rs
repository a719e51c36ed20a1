//! Why a snapshot was taken

use crate::errors::SnapshotError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest cause name the store accepts
pub const MAX_CAUSE_LEN: usize = 32;

/// Event that triggered a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SaveCause {
    Disconnect,
    WorldSave,
    Death,
    ServerShutdown,
    InventoryCommand,
    EnderchestCommand,
    BackupRestore,
    Api,
    MpdbMigration,
    LegacyMigration,
    ConvertedFromV2,
    /// Cause registered by an extension; normalized to upper snake case
    Other(String),
}

impl SaveCause {
    const NAMED: [SaveCause; 11] = [
        SaveCause::Disconnect,
        SaveCause::WorldSave,
        SaveCause::Death,
        SaveCause::ServerShutdown,
        SaveCause::InventoryCommand,
        SaveCause::EnderchestCommand,
        SaveCause::BackupRestore,
        SaveCause::Api,
        SaveCause::MpdbMigration,
        SaveCause::LegacyMigration,
        SaveCause::ConvertedFromV2,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            SaveCause::Disconnect => "DISCONNECT",
            SaveCause::WorldSave => "WORLD_SAVE",
            SaveCause::Death => "DEATH",
            SaveCause::ServerShutdown => "SERVER_SHUTDOWN",
            SaveCause::InventoryCommand => "INVENTORY_COMMAND",
            SaveCause::EnderchestCommand => "ENDERCHEST_COMMAND",
            SaveCause::BackupRestore => "BACKUP_RESTORE",
            SaveCause::Api => "API",
            SaveCause::MpdbMigration => "MPDB_MIGRATION",
            SaveCause::LegacyMigration => "LEGACY_MIGRATION",
            SaveCause::ConvertedFromV2 => "CONVERTED_FROM_V2",
            SaveCause::Other(name) => name,
        }
    }

    /// Lowercase, space separated name for operator output
    pub fn display_name(&self) -> String {
        self.as_str().to_lowercase().replace('_', " ")
    }

    pub fn is_migration(&self) -> bool {
        matches!(
            self,
            SaveCause::MpdbMigration | SaveCause::LegacyMigration | SaveCause::ConvertedFromV2
        )
    }
}

impl fmt::Display for SaveCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaveCause {
    type Err = SnapshotError;

    /// Known names map to their variant; anything else becomes `Other`,
    /// upper-snake-cased and cut to [`MAX_CAUSE_LEN`] characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c.is_whitespace() || c == '-' { '_' } else { c.to_ascii_uppercase() })
            .take(MAX_CAUSE_LEN)
            .collect();
        if normalized.is_empty() {
            return Err(SnapshotError::InvalidSaveCause {
                reason: "save cause name is empty".to_string(),
            });
        }
        Ok(Self::NAMED
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(SaveCause::Other(normalized)))
    }
}

impl TryFrom<String> for SaveCause {
    type Error = SnapshotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SaveCause> for String {
    fn from(cause: SaveCause) -> Self {
        cause.as_str().to_string()
    }
}
