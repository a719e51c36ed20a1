//! statehop core - snapshot model shared by every process in a network
//!
//! This crate holds everything that does not touch storage or the network:
//! - Identifiers for syncable features and their dependency graph
//! - The built-in data containers and the `DataOwner` boundary to live state
//! - Per-feature serializers and the frozen serializer registry
//! - Packed/unpacked snapshots and the versioned wire codec
//! - Settings, logging and diagnostic rendering

pub use statehop_core_types as core_types;

pub mod config;
pub mod data;
pub mod errors;
pub mod identifier;
pub mod logging_facility;
pub mod registry;
pub mod render;
pub mod serializer;
pub mod snapshot;

// Re-export commonly used types
pub use data::{DataContainer, DataOwner};
pub use errors::{Result, SnapshotError, SyncError, SyncErrorKind};
pub use identifier::{BuiltinFeature, Dependency, Identifier};
pub use registry::{FeatureToggles, RegistryBuilder, SerializerRegistry};
pub use serializer::{Feature, Serializer};
pub use snapshot::{
    FormatContext, PackedSnapshot, SaveCause, SnapshotCodec, SnapshotMeta, UnpackedSnapshot,
};
