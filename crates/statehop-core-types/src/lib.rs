//! Core types shared across the statehop crates
//!
//! This crate holds the small vocabulary every other crate speaks:
//!
//! - **Identity types**: UserId, SnapshotId
//! - **Sensitive data**: Sensitive<T> marker for automatic redaction
//! - **Schema constants**: Canonical log field keys and event names

pub mod ids;
pub mod schema;
pub mod sensitive;

pub use ids::{SnapshotId, UserId};
pub use sensitive::Sensitive;
