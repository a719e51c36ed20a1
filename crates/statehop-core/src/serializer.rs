//! Per-feature codecs
//!
//! A [`Serializer`] turns one feature's [`DataContainer`] into bytes and
//! back. Built-in features use [`JsonSerializer`], parameterised by the
//! feature's data type; third-party features can use [`CustomJsonSerializer`]
//! or bring their own implementation.

use crate::data::{
    Advancements, CustomData, DataContainer, EnderChest, Experience, Food, GameMode, Health,
    Inventory, Location, PersistentData, PotionEffects, Statistics,
};
use crate::errors::{Result, SnapshotError};
use crate::identifier::{BuiltinFeature, Identifier};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// Pure codec between a container and bytes
pub trait Serializer: Send + Sync {
    /// # Errors
    ///
    /// Fails when handed a container of the wrong variant or when encoding fails
    fn serialize(&self, container: &DataContainer) -> Result<Vec<u8>>;

    /// # Errors
    ///
    /// Fails when the bytes are not a valid encoding for this feature
    fn deserialize(&self, bytes: &[u8]) -> Result<DataContainer>;
}

/// Typed data of a built-in feature
pub trait Feature: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const FEATURE: BuiltinFeature;

    fn into_container(self) -> DataContainer;

    fn from_container(container: &DataContainer) -> Option<&Self>;
}

macro_rules! builtin_feature {
    ($ty:ident) => {
        impl Feature for $ty {
            const FEATURE: BuiltinFeature = BuiltinFeature::$ty;

            fn into_container(self) -> DataContainer {
                DataContainer::$ty(self)
            }

            fn from_container(container: &DataContainer) -> Option<&Self> {
                match container {
                    DataContainer::$ty(data) => Some(data),
                    _ => None,
                }
            }
        }
    };
}

builtin_feature!(Inventory);
builtin_feature!(EnderChest);
builtin_feature!(PotionEffects);
builtin_feature!(Advancements);
builtin_feature!(Location);
builtin_feature!(Statistics);
builtin_feature!(Health);
builtin_feature!(Food);
builtin_feature!(Experience);
builtin_feature!(GameMode);
builtin_feature!(PersistentData);

/// JSON codec for one built-in feature type
pub struct JsonSerializer<F> {
    _feature: PhantomData<fn() -> F>,
}

impl<F: Feature> JsonSerializer<F> {
    pub fn new() -> Self {
        Self {
            _feature: PhantomData,
        }
    }
}

impl<F: Feature> Default for JsonSerializer<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Feature> Serializer for JsonSerializer<F> {
    fn serialize(&self, container: &DataContainer) -> Result<Vec<u8>> {
        let data = F::from_container(container).ok_or_else(|| SnapshotError::Serialization {
            message: format!("expected a {} container", F::FEATURE.key()),
        })?;
        Ok(serde_json::to_vec(data)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<DataContainer> {
        let data: F = serde_json::from_slice(bytes)?;
        Ok(data.into_container())
    }
}

/// JSON codec for a third-party feature whose data is free-form
#[derive(Debug, Default, Clone, Copy)]
pub struct CustomJsonSerializer;

impl Serializer for CustomJsonSerializer {
    fn serialize(&self, container: &DataContainer) -> Result<Vec<u8>> {
        match container {
            DataContainer::Custom(CustomData { value }) => Ok(serde_json::to_vec(value)?),
            _ => Err(SnapshotError::Serialization {
                message: "expected a custom container".to_string(),
            }),
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<DataContainer> {
        let value = serde_json::from_slice(bytes)?;
        Ok(DataContainer::Custom(CustomData { value }))
    }
}

fn json<F: Feature>() -> Arc<dyn Serializer> {
    Arc::new(JsonSerializer::<F>::new())
}

/// Default codec for every built-in feature, keyed by its identifier
pub fn builtin_serializers() -> Vec<(Identifier, Arc<dyn Serializer>)> {
    BuiltinFeature::ALL
        .into_iter()
        .map(|feature| {
            let serializer = match feature {
                BuiltinFeature::Inventory => json::<Inventory>(),
                BuiltinFeature::EnderChest => json::<EnderChest>(),
                BuiltinFeature::PotionEffects => json::<PotionEffects>(),
                BuiltinFeature::Advancements => json::<Advancements>(),
                BuiltinFeature::Location => json::<Location>(),
                BuiltinFeature::Statistics => json::<Statistics>(),
                BuiltinFeature::Health => json::<Health>(),
                BuiltinFeature::Food => json::<Food>(),
                BuiltinFeature::Experience => json::<Experience>(),
                BuiltinFeature::GameMode => json::<GameMode>(),
                BuiltinFeature::PersistentData => json::<PersistentData>(),
            };
            (feature.identifier(), serializer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ItemStack, Items};

    #[test]
    fn test_json_serializer_rejects_wrong_variant() {
        let serializer = JsonSerializer::<Inventory>::new();
        let err = serializer
            .serialize(&DataContainer::EnderChest(EnderChest::default()))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Serialization { .. }));
    }

    #[test]
    fn test_json_serializer_round_trip() {
        let mut items = Items::with_size(4);
        items.slots[2] = Some(ItemStack::new("torch", 64));
        let container = DataContainer::EnderChest(EnderChest { items });
        let serializer = JsonSerializer::<EnderChest>::new();

        let bytes = serializer.serialize(&container).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), container);
    }

    #[test]
    fn test_garbage_bytes_fail_cleanly() {
        let serializer = JsonSerializer::<Health>::new();
        assert!(serializer.deserialize(b"\x00\x01not json").is_err());
    }

    #[test]
    fn test_builtin_serializers_cover_every_feature() {
        let all = builtin_serializers();
        assert_eq!(all.len(), BuiltinFeature::ALL.len());
    }
}
