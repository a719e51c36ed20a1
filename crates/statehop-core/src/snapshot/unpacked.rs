use super::{now, FormatContext, PackedSnapshot, SaveCause, SnapshotMeta};
use crate::data::{DataContainer, DataOwner};
use crate::errors::{Result, SnapshotError};
use crate::identifier::Identifier;
use crate::registry::SerializerRegistry;
use crate::serializer::Feature;
use chrono::{DateTime, FixedOffset};
use statehop_core_types::SnapshotId;
use std::collections::BTreeMap;

/// Metadata plus decoded feature containers
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedSnapshot {
    meta: SnapshotMeta,
    data: BTreeMap<Identifier, DataContainer>,
    retained: BTreeMap<String, Vec<u8>>,
}

impl UnpackedSnapshot {
    pub(crate) fn from_parts(
        meta: SnapshotMeta,
        data: BTreeMap<Identifier, DataContainer>,
        retained: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            meta,
            data,
            retained,
        }
    }

    pub fn builder(ctx: &FormatContext) -> SnapshotBuilder<'_> {
        SnapshotBuilder::new(ctx)
    }

    /// Read every enabled feature from the owner
    ///
    /// Features the owner has nothing for are left out of the snapshot.
    pub fn capture(
        ctx: &FormatContext,
        registry: &SerializerRegistry,
        owner: &dyn DataOwner,
        cause: SaveCause,
    ) -> Result<Self> {
        let mut data = BTreeMap::new();
        for entry in registry.enabled() {
            if let Some(container) = owner.produce(entry.identifier())? {
                if !container.fits(entry.identifier()) {
                    return Err(SnapshotError::Owner {
                        identifier: entry.identifier().as_key(),
                        reason: "produced a container of another feature".to_string(),
                    });
                }
                data.insert(entry.identifier().clone(), container);
            }
        }
        Ok(Self {
            meta: ctx.meta(SnapshotId::new(), now(), cause, false),
            data,
            retained: BTreeMap::new(),
        })
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    pub fn id(&self) -> SnapshotId {
        self.meta.id()
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

    pub fn get(&self, identifier: &Identifier) -> Option<&DataContainer> {
        self.data.get(identifier)
    }

    /// Store a container under `identifier`, replacing any previous one
    ///
    /// # Errors
    ///
    /// `InvalidSnapshot` if the container belongs to another feature.
    pub fn set(&mut self, identifier: Identifier, container: DataContainer) -> Result<()> {
        if !container.fits(&identifier) {
            return Err(SnapshotError::InvalidSnapshot {
                reason: format!("container does not belong to {}", identifier),
            });
        }
        self.data.insert(identifier, container);
        Ok(())
    }

    pub fn remove(&mut self, identifier: &Identifier) -> Option<DataContainer> {
        self.data.remove(identifier)
    }

    /// Typed access to a built-in feature
    pub fn feature<F: Feature>(&self) -> Option<&F> {
        self.data
            .get(&F::FEATURE.identifier())
            .and_then(F::from_container)
    }

    pub fn set_feature<F: Feature>(&mut self, data: F) {
        self.data.insert(F::FEATURE.identifier(), data.into_container());
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.data.keys()
    }

    /// Raw entries carried through without a decoder
    pub fn retained(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.retained
    }

    /// Serialize every container in dependency order
    ///
    /// # Errors
    ///
    /// `MissingSerializer` if a container's identifier is not registered.
    pub fn pack(&self, registry: &SerializerRegistry) -> Result<PackedSnapshot> {
        let mut ordered: Vec<(usize, &Identifier, &DataContainer)> = self
            .data
            .iter()
            .map(|(identifier, container)| {
                registry
                    .position(identifier)
                    .map(|pos| (pos, identifier, container))
                    .ok_or_else(|| SnapshotError::MissingSerializer {
                        key: identifier.as_key(),
                    })
            })
            .collect::<Result<_>>()?;
        ordered.sort_by_key(|(pos, _, _)| *pos);

        let mut data = self.retained.clone();
        for (_, identifier, container) in ordered {
            data.insert(identifier.as_key(), registry.serialize(identifier, container)?);
        }
        Ok(PackedSnapshot::new(self.meta.clone(), data))
    }

    /// Overwrite the owner's live state, feature by feature
    ///
    /// Runs in registry order and stops at the first failure.
    pub fn apply_to(&self, registry: &SerializerRegistry, owner: &mut dyn DataOwner) -> Result<()> {
        for entry in registry.enabled() {
            if let Some(container) = self.data.get(entry.identifier()) {
                container.apply(entry.identifier(), owner)?;
            }
        }
        Ok(())
    }
}

/// Builds an unpacked snapshot by hand (API saves, tests, importers)
pub struct SnapshotBuilder<'a> {
    ctx: &'a FormatContext,
    id: Option<SnapshotId>,
    timestamp: Option<DateTime<FixedOffset>>,
    save_cause: Option<SaveCause>,
    pinned: bool,
    data: BTreeMap<Identifier, DataContainer>,
}

impl<'a> SnapshotBuilder<'a> {
    fn new(ctx: &'a FormatContext) -> Self {
        Self {
            ctx,
            id: None,
            timestamp: None,
            save_cause: None,
            pinned: false,
            data: BTreeMap::new(),
        }
    }

    pub fn id(mut self, id: SnapshotId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn save_cause(mut self, cause: SaveCause) -> Self {
        self.save_cause = Some(cause);
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn data(mut self, identifier: Identifier, container: DataContainer) -> Self {
        self.data.insert(identifier, container);
        self
    }

    pub fn feature<F: Feature>(self, data: F) -> Self {
        self.data(F::FEATURE.identifier(), data.into_container())
    }

    /// # Errors
    ///
    /// `InvalidSnapshot` when no save cause was given, the timestamp lies in
    /// the future, or a container does not fit its identifier.
    pub fn build(self) -> Result<UnpackedSnapshot> {
        let save_cause = self.save_cause.ok_or_else(|| SnapshotError::InvalidSnapshot {
            reason: "a save cause is required".to_string(),
        })?;
        let current = now();
        let timestamp = self.timestamp.unwrap_or(current);
        if timestamp > current {
            return Err(SnapshotError::InvalidSnapshot {
                reason: format!("timestamp {} is in the future", timestamp.to_rfc3339()),
            });
        }
        if let Some((identifier, _)) = self.data.iter().find(|(i, c)| !c.fits(i)) {
            return Err(SnapshotError::InvalidSnapshot {
                reason: format!("container does not belong to {}", identifier),
            });
        }
        Ok(UnpackedSnapshot {
            meta: self.ctx.meta(
                self.id.unwrap_or_default(),
                timestamp,
                save_cause,
                self.pinned,
            ),
            data: self.data,
            retained: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Food, Health};
    use crate::registry::{FeatureToggles, RegistryBuilder};
    use crate::snapshot::HostVersion;

    fn ctx() -> FormatContext {
        FormatContext::new(HostVersion::new(1, 20, 4), "paper", "lobby-1")
    }

    #[test]
    fn test_builder_requires_cause() {
        let err = UnpackedSnapshot::builder(&ctx()).build().unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidSnapshot { .. }));
    }

    #[test]
    fn test_builder_rejects_future_timestamp() {
        let future = now() + chrono::Duration::hours(1);
        let err = UnpackedSnapshot::builder(&ctx())
            .save_cause(SaveCause::Api)
            .timestamp(future)
            .build()
            .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidSnapshot { .. }));
    }

    #[test]
    fn test_pack_keeps_retained_entries() {
        let registry = RegistryBuilder::with_builtins()
            .freeze(&FeatureToggles::new())
            .unwrap();
        let ctx = ctx();
        let original = UnpackedSnapshot::builder(&ctx)
            .save_cause(SaveCause::Death)
            .feature(Health {
                health: 4.0,
                health_scale: 20.0,
                health_scaled: false,
            })
            .build()
            .unwrap();
        let mut packed = original.pack(&registry).unwrap();
        let mut data = packed.data().clone();
        data.insert("quests:log".to_string(), vec![1, 2, 3]);
        packed = PackedSnapshot::new(packed.meta().clone(), data);

        let unpacked = packed.unpack(&registry).unwrap();
        assert_eq!(unpacked.retained().len(), 1);
        assert_eq!(unpacked.pack(&registry).unwrap(), packed);
    }

    #[test]
    fn test_set_rejects_mismatched_container() {
        let mut snapshot = UnpackedSnapshot::builder(&ctx())
            .save_cause(SaveCause::Api)
            .build()
            .unwrap();
        let food = DataContainer::Food(Food {
            food_level: 20,
            saturation: 5.0,
            exhaustion: 0.0,
        });
        let health = crate::identifier::BuiltinFeature::Health.identifier();
        assert!(snapshot.set(health, food).is_err());
    }
}
