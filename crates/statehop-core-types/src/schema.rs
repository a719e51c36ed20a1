//! Canonical schema constants for structured logging
//!
//! Every crate logs through these keys so that a save on one server and the
//! matching join on another can be stitched together from their logs.

pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";

// Entity identifiers
pub const FIELD_USER_ID: &str = "user_id";
pub const FIELD_SNAPSHOT_ID: &str = "snapshot_id";
pub const FIELD_IDENTIFIER: &str = "identifier";
pub const FIELD_SERVER: &str = "server";

// Sizes
pub const FIELD_PAYLOAD_BYTES: &str = "payload_bytes";
pub const FIELD_DELETED: &str = "deleted";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
