//! Wire encoding and the load-time compatibility gate

use super::{HostVersion, PackedSnapshot, SaveCause, SnapshotMeta};
use crate::errors::{Result, SnapshotError};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use statehop_core_types::SnapshotId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Format version written by this build
pub const CURRENT_FORMAT_VERSION: u32 = 5;

/// Oldest format the current envelope reader understands without conversion
pub const MIN_NATIVE_FORMAT_VERSION: u32 = 4;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const ZSTD_LEVEL: i32 = 3;

/// Converts one legacy format straight to a current-format snapshot
pub trait LegacyConverter: Send + Sync {
    /// `payload` is already decompressed. `id` and `timestamp` come from the
    /// store row, since legacy payloads do not carry them reliably.
    fn convert(
        &self,
        payload: &[u8],
        id: SnapshotId,
        timestamp: DateTime<FixedOffset>,
        ctx: &FormatContext,
    ) -> Result<PackedSnapshot>;
}

/// What this process writes, and what it accepts on read
#[derive(Clone)]
pub struct FormatContext {
    format_version: u32,
    min_native_version: u32,
    host_version: HostVersion,
    platform_type: String,
    server_name: String,
    legacy: BTreeMap<u32, Arc<dyn LegacyConverter>>,
}

impl FormatContext {
    pub fn new(
        host_version: HostVersion,
        platform_type: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            min_native_version: MIN_NATIVE_FORMAT_VERSION,
            host_version,
            platform_type: platform_type.into(),
            server_name: server_name.into(),
            legacy: BTreeMap::new(),
        }
    }

    /// Override the written format version (tests and staged rollouts)
    pub fn with_format_version(mut self, version: u32) -> Self {
        self.format_version = version;
        self
    }

    pub fn with_min_native_version(mut self, version: u32) -> Self {
        self.min_native_version = version;
        self
    }

    /// Register the converter for payloads written at `from_version`
    pub fn with_legacy_converter(
        mut self,
        from_version: u32,
        converter: Arc<dyn LegacyConverter>,
    ) -> Self {
        self.legacy.insert(from_version, converter);
        self
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn host_version(&self) -> HostVersion {
        self.host_version
    }

    pub fn platform_type(&self) -> &str {
        &self.platform_type
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Versions that have a registered converter, ascending
    pub fn legacy_versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.legacy.keys().copied()
    }

    /// Metadata stamped with this process's versions
    pub fn meta(
        &self,
        id: SnapshotId,
        timestamp: DateTime<FixedOffset>,
        save_cause: SaveCause,
        pinned: bool,
    ) -> SnapshotMeta {
        SnapshotMeta::new(
            id,
            timestamp,
            save_cause,
            pinned,
            self.server_name.clone(),
            self.host_version,
            self.platform_type.clone(),
            self.format_version,
        )
    }
}

impl std::fmt::Debug for FormatContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatContext")
            .field("format_version", &self.format_version)
            .field("min_native_version", &self.min_native_version)
            .field("host_version", &self.host_version)
            .field("platform_type", &self.platform_type)
            .field("legacy", &self.legacy.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    id: SnapshotId,
    pinned: bool,
    timestamp: DateTime<FixedOffset>,
    save_cause: SaveCause,
    server_name: String,
    host_version: HostVersion,
    platform_type: String,
    format_version: u32,
    #[serde(with = "payload_map")]
    data: BTreeMap<String, Vec<u8>>,
}

/// The fields the gate needs, readable from every format generation
#[derive(Deserialize)]
struct EnvelopeHeader {
    #[serde(default)]
    format_version: u32,
    #[serde(default, alias = "minecraft_version")]
    host_version: Option<String>,
    #[serde(default)]
    platform_type: Option<String>,
}

mod payload_map {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        data: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        data.iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| STANDARD.decode(v).map(|bytes| (k, bytes)).map_err(D::Error::custom))
            .collect()
    }
}

/// Encodes packed snapshots to bytes and gates decoding
#[derive(Debug, Clone)]
pub struct SnapshotCodec {
    ctx: Arc<FormatContext>,
    compress: bool,
}

impl SnapshotCodec {
    pub fn new(ctx: Arc<FormatContext>, compress: bool) -> Self {
        Self { ctx, compress }
    }

    pub fn context(&self) -> &FormatContext {
        &self.ctx
    }

    /// Serialize to the JSON envelope, zstd-compressed when enabled
    pub fn encode(&self, snapshot: &PackedSnapshot) -> Result<Vec<u8>> {
        let meta = snapshot.meta();
        let envelope = Envelope {
            id: meta.id(),
            pinned: meta.is_pinned(),
            timestamp: meta.timestamp(),
            save_cause: meta.save_cause().clone(),
            server_name: meta.server_name().to_string(),
            host_version: meta.host_version(),
            platform_type: meta.platform_type().to_string(),
            format_version: meta.format_version(),
            data: snapshot.data().clone(),
        };
        let json = serde_json::to_vec(&envelope)?;
        if !self.compress {
            return Ok(json);
        }
        zstd::stream::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(|e| {
            SnapshotError::Compression {
                message: e.to_string(),
            }
        })
    }

    /// Decode bytes that arrived without a store row (the handoff channel)
    ///
    /// # Errors
    ///
    /// The compatibility gate errors, in order: `InvalidFormatVersion`,
    /// `InvalidHostVersion`, `InvalidPlatformType`, then
    /// `NoLegacyConverter`. Legacy payloads additionally need a stored id
    /// and timestamp, so they fail here with `InvalidSnapshot`.
    pub fn decode(&self, bytes: &[u8]) -> Result<PackedSnapshot> {
        self.decode_inner(bytes, None)
    }

    /// Decode a payload read from the store, with the row's id and timestamp
    ///
    /// # Errors
    ///
    /// Same gate as [`SnapshotCodec::decode`].
    pub fn deserialize(
        &self,
        bytes: &[u8],
        id: SnapshotId,
        timestamp: DateTime<FixedOffset>,
    ) -> Result<PackedSnapshot> {
        self.decode_inner(bytes, Some((id, timestamp)))
    }

    fn decode_inner(
        &self,
        bytes: &[u8],
        origin: Option<(SnapshotId, DateTime<FixedOffset>)>,
    ) -> Result<PackedSnapshot> {
        let raw = decompress(bytes)?;
        let header: EnvelopeHeader = serde_json::from_slice(&raw)?;
        let ctx = &self.ctx;

        if header.format_version > ctx.format_version {
            return Err(SnapshotError::InvalidFormatVersion {
                found: header.format_version,
                supported: ctx.format_version,
            });
        }

        if let Some(found) = &header.host_version {
            let compatible = found
                .parse::<HostVersion>()
                .is_ok_and(|v| v <= ctx.host_version);
            if !compatible {
                return Err(SnapshotError::InvalidHostVersion {
                    found: found.clone(),
                    running: ctx.host_version.to_string(),
                });
            }
        }

        if let Some(found) = &header.platform_type {
            if !found.eq_ignore_ascii_case(&ctx.platform_type) {
                return Err(SnapshotError::InvalidPlatformType {
                    found: found.clone(),
                    expected: ctx.platform_type.clone(),
                });
            }
        }

        if header.format_version < ctx.min_native_version {
            let converter = ctx.legacy.get(&header.format_version).ok_or(
                SnapshotError::NoLegacyConverter {
                    format_version: header.format_version,
                },
            )?;
            let (id, timestamp) = origin.ok_or_else(|| SnapshotError::InvalidSnapshot {
                reason: format!(
                    "format version {} payload needs a stored id and timestamp",
                    header.format_version
                ),
            })?;
            tracing::debug!(
                snapshot_id = %id,
                from_version = header.format_version,
                "converting legacy snapshot"
            );
            return converter.convert(&raw, id, timestamp, ctx);
        }

        let envelope: Envelope = serde_json::from_slice(&raw)?;
        let meta = SnapshotMeta::new(
            envelope.id,
            envelope.timestamp,
            envelope.save_cause,
            envelope.pinned,
            envelope.server_name,
            envelope.host_version,
            envelope.platform_type,
            envelope.format_version,
        );
        Ok(PackedSnapshot::new(meta, envelope.data))
    }
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    if !bytes.starts_with(&ZSTD_MAGIC) {
        return Ok(bytes.to_vec());
    }
    zstd::stream::decode_all(bytes).map_err(|e| SnapshotError::Compression {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FormatContext {
        FormatContext::new(HostVersion::new(1, 20, 4), "paper", "lobby-1")
    }

    fn packed(ctx: &FormatContext) -> PackedSnapshot {
        let meta = ctx.meta(SnapshotId::new(), super::super::now(), SaveCause::Api, false);
        PackedSnapshot::new(meta, BTreeMap::from([("quests:log".to_string(), b"[1,2]".to_vec())]))
    }

    #[test]
    fn test_compressed_and_plain_both_decode() {
        let ctx = Arc::new(ctx());
        let snapshot = packed(&ctx);
        for compress in [true, false] {
            let codec = SnapshotCodec::new(ctx.clone(), compress);
            let bytes = codec.encode(&snapshot).unwrap();
            assert_eq!(bytes.starts_with(&ZSTD_MAGIC), compress);
            assert_eq!(codec.decode(&bytes).unwrap(), snapshot);
        }
    }

    #[test]
    fn test_host_version_newer_is_rejected() {
        let writer = Arc::new(FormatContext::new(HostVersion::new(1, 21, 0), "paper", "a"));
        let reader = SnapshotCodec::new(Arc::new(ctx()), false);
        let bytes = SnapshotCodec::new(writer.clone(), false)
            .encode(&packed(&writer))
            .unwrap();
        let err = reader.decode(&bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidHostVersion { .. }));
    }

    #[test]
    fn test_format_check_precedes_platform_check() {
        let writer = Arc::new(
            FormatContext::new(HostVersion::new(1, 20, 4), "fabric", "a").with_format_version(9),
        );
        let bytes = SnapshotCodec::new(writer.clone(), false)
            .encode(&packed(&writer))
            .unwrap();
        let err = SnapshotCodec::new(Arc::new(ctx()), false)
            .decode(&bytes)
            .unwrap_err();
        assert_eq!(
            err,
            SnapshotError::InvalidFormatVersion {
                found: 9,
                supported: CURRENT_FORMAT_VERSION
            }
        );
    }

    #[test]
    fn test_unversioned_payload_without_converter() {
        let codec = SnapshotCodec::new(Arc::new(ctx()), false);
        let err = codec
            .deserialize(br#"{"inventory":"..."}"#, SnapshotId::new(), super::super::now())
            .unwrap_err();
        assert_eq!(err, SnapshotError::NoLegacyConverter { format_version: 0 });
    }
}
