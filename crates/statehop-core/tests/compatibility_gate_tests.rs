#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::{DateTime, FixedOffset};
use common::test_context;
use serde_json::json;
use statehop_core::core_types::SnapshotId;
use statehop_core::errors::{SyncError, SyncErrorKind};
use statehop_core::identifier::BuiltinFeature;
use statehop_core::snapshot::{
    now, FormatContext, HostVersion, LegacyConverter, PackedSnapshot, SaveCause, SnapshotCodec,
    CURRENT_FORMAT_VERSION,
};
use statehop_core::{Result, SnapshotError};
use std::collections::BTreeMap;
use std::sync::Arc;

fn encode_with(writer: FormatContext) -> Vec<u8> {
    let meta = writer.meta(SnapshotId::new(), now(), SaveCause::Disconnect, false);
    let packed = PackedSnapshot::new(meta, BTreeMap::new());
    SnapshotCodec::new(Arc::new(writer), true)
        .encode(&packed)
        .unwrap()
}

fn reader() -> SnapshotCodec {
    SnapshotCodec::new(Arc::new(test_context()), true)
}

#[test]
fn test_same_versions_are_accepted() {
    let bytes = encode_with(test_context());
    assert!(reader().decode(&bytes).is_ok());
}

#[test]
fn test_older_host_version_is_accepted() {
    let bytes = encode_with(FormatContext::new(HostVersion::new(1, 19, 2), "paper", "old"));
    let snapshot = reader().decode(&bytes).unwrap();
    assert_eq!(snapshot.meta().host_version(), HostVersion::new(1, 19, 2));
}

#[test]
fn test_newer_format_version_is_rejected() {
    let writer = test_context().with_format_version(CURRENT_FORMAT_VERSION + 1);
    let err = reader().decode(&encode_with(writer)).unwrap_err();
    assert!(matches!(err, SnapshotError::InvalidFormatVersion { .. }));

    let sync: SyncError = err.into();
    assert_eq!(sync.kind(), SyncErrorKind::InvalidFormatVersion);
    assert_eq!(sync.code(), "ERR_INVALID_FORMAT_VERSION");
}

#[test]
fn test_newer_host_version_is_rejected() {
    let writer = FormatContext::new(HostVersion::new(1, 20, 5), "paper", "new");
    let err = reader().decode(&encode_with(writer)).unwrap_err();
    assert_eq!(
        err,
        SnapshotError::InvalidHostVersion {
            found: "1.20.5".to_string(),
            running: "1.20.4".to_string(),
        }
    );
}

#[test]
fn test_platform_mismatch_is_rejected() {
    let writer = FormatContext::new(HostVersion::new(1, 20, 4), "fabric", "modded");
    let err = reader().decode(&encode_with(writer)).unwrap_err();
    assert!(matches!(err, SnapshotError::InvalidPlatformType { found, .. } if found == "fabric"));
}

#[test]
fn test_platform_match_ignores_case() {
    let writer = FormatContext::new(HostVersion::new(1, 20, 4), "Paper", "lobby-2");
    assert!(reader().decode(&encode_with(writer)).is_ok());
}

#[test]
fn test_host_check_precedes_platform_check() {
    let writer = FormatContext::new(HostVersion::new(1, 21, 0), "fabric", "modded");
    let err = reader().decode(&encode_with(writer)).unwrap_err();
    assert!(matches!(err, SnapshotError::InvalidHostVersion { .. }));
}

#[test]
fn test_truncated_payload_fails_cleanly() {
    let bytes = encode_with(test_context());
    let err = reader().decode(&bytes[..bytes.len() / 2]).unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::Compression { .. } | SnapshotError::Serialization { .. }
    ));
}

/// Reads the flat `{"format_version": 3, "health": 12.0}` layout
struct V3Converter;

impl LegacyConverter for V3Converter {
    fn convert(
        &self,
        payload: &[u8],
        id: SnapshotId,
        timestamp: DateTime<FixedOffset>,
        ctx: &FormatContext,
    ) -> Result<PackedSnapshot> {
        let legacy: serde_json::Value = serde_json::from_slice(payload)?;
        let health = legacy["health"].as_f64().ok_or(SnapshotError::InvalidSnapshot {
            reason: "missing health".to_string(),
        })?;
        let blob = serde_json::to_vec(&json!({
            "health": health,
            "health_scale": 20.0,
        }))?;
        let meta = ctx.meta(id, timestamp, SaveCause::ConvertedFromV2, false);
        Ok(PackedSnapshot::new(
            meta,
            BTreeMap::from([(BuiltinFeature::Health.identifier().as_key(), blob)]),
        ))
    }
}

#[test]
fn test_legacy_payload_uses_registered_converter() {
    let ctx = test_context().with_legacy_converter(3, Arc::new(V3Converter));
    let codec = SnapshotCodec::new(Arc::new(ctx), false);
    let id = SnapshotId::new();
    let timestamp = now();

    let converted = codec
        .deserialize(br#"{"format_version": 3, "health": 12.0}"#, id, timestamp)
        .unwrap();

    assert_eq!(converted.id(), id);
    assert_eq!(converted.timestamp(), timestamp);
    assert_eq!(converted.meta().format_version(), CURRENT_FORMAT_VERSION);
    assert!(converted.has(&BuiltinFeature::Health.identifier()));
}

#[test]
fn test_legacy_payload_without_converter_is_rejected() {
    let codec = SnapshotCodec::new(Arc::new(test_context()), false);
    let err = codec
        .deserialize(br#"{"format_version": 2}"#, SnapshotId::new(), now())
        .unwrap_err();
    assert_eq!(err, SnapshotError::NoLegacyConverter { format_version: 2 });
}

#[test]
fn test_legacy_payload_over_handoff_is_rejected() {
    let ctx = test_context().with_legacy_converter(3, Arc::new(V3Converter));
    let codec = SnapshotCodec::new(Arc::new(ctx), false);
    let err = codec.decode(br#"{"format_version": 3, "health": 1.0}"#).unwrap_err();
    assert!(matches!(err, SnapshotError::InvalidSnapshot { .. }));
}
