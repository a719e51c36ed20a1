//! statehop engine - moves user state between processes
//!
//! Provides:
//! - [`SyncEngine`]: join, retry, save and disconnect handling per user
//! - The [`handoff`] relay with in-memory and Redis backends
//! - [`SimThread`], the single thread that touches live state

pub mod engine;
pub mod errors;
pub mod executor;
pub mod handoff;
pub mod session;

pub use engine::{EngineConfig, SyncEngine};
pub use errors::Result;
pub use executor::SimThread;
pub use handoff::{HandoffChannel, HandoffKeys, MemoryHandoff, RedisHandoff};
pub use session::{LoadSource, Session, SessionState, SharedOwner};
