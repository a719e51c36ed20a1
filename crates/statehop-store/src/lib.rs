//! statehop store - durable snapshot persistence
//!
//! Provides:
//! - The [`SnapshotStore`] contract with SQLite and in-memory backends
//! - Embedded, checksummed SQLite migrations
//! - [`SnapshotLedger`], which applies the codec and the retention policy

pub mod contract;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use contract::{CollapseWindow, Insertion, SnapshotRow, SnapshotStore, StoredUser};
pub use errors::Result;
pub use ledger::{RetentionPolicy, SnapshotLedger};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
