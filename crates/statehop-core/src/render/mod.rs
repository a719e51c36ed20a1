//! Operator-facing views of stored snapshots

pub mod snapshot_render;

pub use snapshot_render::{render_json, render_json_pretty, render_overview};
