//! Ephemeral handoff channel
//!
//! A keyed, TTL-bound relay that carries a user's freshest snapshot from the
//! process they left to the one they join, faster than the store commits.
//!
//! Two keys per user:
//! - `statehop:{cluster}:server_switch:{uuid}`: marker set on disconnect,
//!   holding the id of the snapshot being handed off
//! - `statehop:{cluster}:data_update:{uuid}`: the encoded snapshot
//!
//! Both reads are atomic get-and-delete, so each value is consumed at most
//! once.

mod memory;
mod redis;

pub use self::memory::MemoryHandoff;
pub use self::redis::RedisHandoff;

use async_trait::async_trait;
use statehop_core::errors::{SyncError, SyncErrorKind};
use statehop_core_types::{SnapshotId, UserId};
use std::time::Duration;

pub type HandoffResult<T> = std::result::Result<T, SyncError>;

const KEY_NAMESPACE: &str = "statehop";

/// Key layout for one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffKeys {
    cluster: String,
}

impl HandoffKeys {
    pub fn new(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_lowercase(),
        }
    }

    pub fn data_update(&self, user_id: UserId) -> String {
        format!("{}:{}:data_update:{}", KEY_NAMESPACE, self.cluster, user_id)
    }

    pub fn server_switch(&self, user_id: UserId) -> String {
        format!("{}:{}:server_switch:{}", KEY_NAMESPACE, self.cluster, user_id)
    }
}

/// Relay between processes of one cluster
#[async_trait]
pub trait HandoffChannel: Send + Sync {
    /// Mark the user as switching servers, naming the snapshot in flight
    async fn set_server_switch(
        &self,
        user_id: UserId,
        snapshot_id: SnapshotId,
        ttl: Duration,
    ) -> HandoffResult<()>;

    /// Consume the switch marker
    async fn take_server_switch(&self, user_id: UserId) -> HandoffResult<Option<SnapshotId>>;

    /// Publish an encoded snapshot
    async fn set_data_update(&self, user_id: UserId, payload: Vec<u8>, ttl: Duration)
        -> HandoffResult<()>;

    /// Consume the published snapshot
    async fn take_data_update(&self, user_id: UserId) -> HandoffResult<Option<Vec<u8>>>;
}

pub(crate) fn handoff_error(op: &str, message: impl Into<String>) -> SyncError {
    SyncError::new(SyncErrorKind::Handoff)
        .with_op(op)
        .with_message(message)
}

pub(crate) fn parse_marker(op: &str, bytes: &[u8]) -> HandoffResult<SnapshotId> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| handoff_error(op, "server switch marker is not a snapshot id"))
}
