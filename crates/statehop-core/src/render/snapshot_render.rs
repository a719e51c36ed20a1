use crate::errors::Result;
use crate::registry::SerializerRegistry;
use crate::snapshot::PackedSnapshot;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Map, Value};

/// Render a snapshot as a JSON document
///
/// Metadata is rendered as-is. Each feature blob is decoded with its
/// registered serializer and shown as a preview; blobs without a serializer
/// (or that fail to decode) are shown as base64 so nothing is hidden.
pub fn render_json(snapshot: &PackedSnapshot, registry: &SerializerRegistry) -> Value {
    let meta = snapshot.meta();
    let mut data = Map::new();

    for (key, bytes) in snapshot.data() {
        let decoded = registry
            .get(key)
            .map(|entry| entry.serializer().deserialize(bytes));
        let value = match decoded {
            Some(Ok(container)) => json!({ "preview": container.preview() }),
            Some(Err(e)) => json!({ "base64": STANDARD.encode(bytes), "error": e.to_string() }),
            None => json!({ "base64": STANDARD.encode(bytes) }),
        };
        data.insert(key.clone(), value);
    }

    json!({
        "id": meta.id().to_string(),
        "short_id": meta.short_id(),
        "timestamp": meta.timestamp().to_rfc3339(),
        "save_cause": meta.save_cause().as_str(),
        "pinned": meta.is_pinned(),
        "server_name": meta.server_name(),
        "host_version": meta.host_version().to_string(),
        "platform_type": meta.platform_type(),
        "format_version": meta.format_version(),
        "payload_bytes": snapshot.payload_size(),
        "data": data,
    })
}

pub fn render_json_pretty(snapshot: &PackedSnapshot, registry: &SerializerRegistry) -> Result<String> {
    Ok(serde_json::to_string_pretty(&render_json(snapshot, registry))?)
}

/// Render a short text overview
///
/// One header block with the metadata, then one line per feature with its
/// blob size. Features the registry does not know are marked.
pub fn render_overview(snapshot: &PackedSnapshot, registry: &SerializerRegistry) -> String {
    let meta = snapshot.meta();
    let mut output = String::new();

    output.push_str(&format!("Snapshot {} ({})\n", meta.short_id(), meta.id()));
    output.push_str(&format!(
        "  saved:    {}\n",
        meta.timestamp().format("%Y-%m-%d %H:%M:%S %:z")
    ));
    output.push_str(&format!("  cause:    {}\n", meta.save_cause().display_name()));
    output.push_str(&format!("  pinned:   {}\n", if meta.is_pinned() { "yes" } else { "no" }));
    output.push_str(&format!(
        "  origin:   {} ({} {}, format v{})\n",
        meta.server_name(),
        meta.platform_type(),
        meta.host_version(),
        meta.format_version()
    ));
    output.push_str(&format!("  size:     {} bytes\n", snapshot.payload_size()));

    if snapshot.data().is_empty() {
        output.push_str("  (no feature data)\n");
        return output;
    }

    output.push_str("  features:\n");
    for (key, bytes) in snapshot.data() {
        let marker = if registry.get(key).is_some() {
            ""
        } else {
            " [unregistered]"
        };
        output.push_str(&format!("    - {} ({} bytes){}\n", key, bytes.len(), marker));
    }

    output
}
