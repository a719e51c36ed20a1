//! Migration framework
//!
//! - SQL files embedded at compile time and applied in order
//! - Each applied migration is recorded with its SHA-256 checksum
//! - Re-running is a no-op; an edited, already-applied file is an error

mod checksums;
mod embedded;
mod runner;

pub use runner::{applied_migrations, apply_migrations};
