//! Versioned data snapshots
//!
//! A snapshot exists in one of two representations:
//!
//! - [`PackedSnapshot`]: metadata plus one opaque byte blob per feature. This
//!   is what gets persisted and handed between processes.
//! - [`UnpackedSnapshot`]: metadata plus decoded [`DataContainer`]s, always
//!   derived from a packed snapshot or freshly captured from a data owner.
//!
//! [`SnapshotCodec`] turns packed snapshots into bytes and back, enforcing
//! the format/host/platform compatibility gate on the way in.
//!
//! [`DataContainer`]: crate::data::DataContainer

mod cause;
mod codec;
mod packed;
mod unpacked;
mod version;

pub use cause::{SaveCause, MAX_CAUSE_LEN};
pub use codec::{
    FormatContext, LegacyConverter, SnapshotCodec, CURRENT_FORMAT_VERSION,
    MIN_NATIVE_FORMAT_VERSION,
};
pub use packed::PackedSnapshot;
pub use unpacked::{SnapshotBuilder, UnpackedSnapshot};
pub use version::HostVersion;

use chrono::{DateTime, FixedOffset, Local};
use statehop_core_types::SnapshotId;

/// Metadata shared by both representations
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    id: SnapshotId,
    timestamp: DateTime<FixedOffset>,
    save_cause: SaveCause,
    pinned: bool,
    server_name: String,
    host_version: HostVersion,
    platform_type: String,
    format_version: u32,
}

impl SnapshotMeta {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SnapshotId,
        timestamp: DateTime<FixedOffset>,
        save_cause: SaveCause,
        pinned: bool,
        server_name: String,
        host_version: HostVersion,
        platform_type: String,
        format_version: u32,
    ) -> Self {
        Self {
            id,
            timestamp,
            save_cause,
            pinned,
            server_name,
            host_version,
            platform_type,
            format_version,
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// First eight characters of the id
    pub fn short_id(&self) -> String {
        self.id.short()
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn save_cause(&self) -> &SaveCause {
        &self.save_cause
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn host_version(&self) -> HostVersion {
        self.host_version
    }

    pub fn platform_type(&self) -> &str {
        &self.platform_type
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub(crate) fn set_pinned(&mut self, pinned: bool) {
        self.pinned = pinned;
    }

    pub(crate) fn set_save_cause(&mut self, cause: SaveCause) {
        self.save_cause = cause;
    }

    /// Same metadata under a new id and the current time
    pub(crate) fn renewed(&self) -> Self {
        Self {
            id: SnapshotId::new(),
            timestamp: now(),
            ..self.clone()
        }
    }
}

/// Current local time with its offset
pub fn now() -> DateTime<FixedOffset> {
    Local::now().into()
}
