use super::{SaveCause, SnapshotMeta, UnpackedSnapshot};
use crate::errors::Result;
use crate::identifier::Identifier;
use crate::registry::SerializerRegistry;
use chrono::{DateTime, FixedOffset};
use statehop_core_types::SnapshotId;
use std::collections::BTreeMap;

/// Metadata plus one serialized blob per feature, keyed by `namespace:key`
#[derive(Debug, Clone, PartialEq)]
pub struct PackedSnapshot {
    meta: SnapshotMeta,
    data: BTreeMap<String, Vec<u8>>,
}

impl PackedSnapshot {
    /// Assemble from parts; used by decoders and legacy converters
    pub fn new(meta: SnapshotMeta, data: BTreeMap<String, Vec<u8>>) -> Self {
        Self { meta, data }
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    pub fn id(&self) -> SnapshotId {
        self.meta.id()
    }

    pub fn short_id(&self) -> String {
        self.meta.short_id()
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.meta.timestamp()
    }

    pub fn save_cause(&self) -> &SaveCause {
        self.meta.save_cause()
    }

    pub fn is_pinned(&self) -> bool {
        self.meta.is_pinned()
    }

    pub fn set_pinned(&mut self, pinned: bool) {
        self.meta.set_pinned(pinned);
    }

    pub fn set_save_cause(&mut self, cause: SaveCause) {
        self.meta.set_save_cause(cause);
    }

    pub fn data(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.data
    }

    /// Total bytes across all feature blobs
    pub fn payload_size(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    /// Decode into containers
    ///
    /// Entries whose identifier is registered and enabled are decoded. The
    /// rest are carried as raw bytes so a later [`UnpackedSnapshot::pack`]
    /// writes them back untouched.
    ///
    /// # Errors
    ///
    /// Fails if a registered serializer rejects its blob.
    pub fn unpack(&self, registry: &SerializerRegistry) -> Result<UnpackedSnapshot> {
        let mut decoded = BTreeMap::new();
        let mut retained = BTreeMap::new();

        for (key, bytes) in &self.data {
            match registry.get(key).filter(|e| e.is_enabled()) {
                Some(entry) => {
                    let container = entry.serializer().deserialize(bytes)?;
                    decoded.insert(entry.identifier().clone(), container);
                }
                None => {
                    retained.insert(key.clone(), bytes.clone());
                }
            }
        }

        Ok(UnpackedSnapshot::from_parts(
            self.meta.clone(),
            decoded,
            retained,
        ))
    }

    /// Unpack, let `edit` change the data, and pack back in place
    ///
    /// Id and timestamp are kept; pinned state and save cause follow
    /// whatever the closure set.
    pub fn edit<F>(&mut self, registry: &SerializerRegistry, edit: F) -> Result<()>
    where
        F: FnOnce(&mut UnpackedSnapshot),
    {
        let mut unpacked = self.unpack(registry)?;
        edit(&mut unpacked);
        let repacked = unpacked.pack(registry)?;
        self.meta.set_pinned(repacked.is_pinned());
        self.meta.set_save_cause(repacked.save_cause().clone());
        self.data = repacked.data;
        Ok(())
    }

    /// Same data under a fresh id and timestamp
    pub fn copy(&self) -> PackedSnapshot {
        Self {
            meta: self.meta.renewed(),
            data: self.data.clone(),
        }
    }

    /// Whether a blob exists for the identifier
    pub fn has(&self, identifier: &Identifier) -> bool {
        self.data.contains_key(&identifier.as_key())
    }
}
