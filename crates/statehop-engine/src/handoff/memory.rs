//! In-process handoff relay
//!
//! Behaves like the Redis backend (TTL expiry, get-and-delete) so two
//! engines sharing one `Arc<MemoryHandoff>` can hand users to each other.

use super::{HandoffChannel, HandoffKeys, HandoffResult};
use async_trait::async_trait;
use statehop_core_types::{SnapshotId, UserId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

pub struct MemoryHandoff {
    keys: HandoffKeys,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryHandoff {
    pub fn new(cluster: &str) -> Self {
        Self {
            keys: HandoffKeys::new(cluster),
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn set(&self, key: String, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    async fn take(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;
        entries
            .remove(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value)
    }

    /// Live (unexpired) keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl HandoffChannel for MemoryHandoff {
    async fn set_server_switch(
        &self,
        user_id: UserId,
        snapshot_id: SnapshotId,
        ttl: Duration,
    ) -> HandoffResult<()> {
        self.set(
            self.keys.server_switch(user_id),
            snapshot_id.to_string().into_bytes(),
            ttl,
        )
        .await;
        Ok(())
    }

    async fn take_server_switch(&self, user_id: UserId) -> HandoffResult<Option<SnapshotId>> {
        self.take(&self.keys.server_switch(user_id))
            .await
            .map(|bytes| super::parse_marker("take_server_switch", &bytes))
            .transpose()
    }

    async fn set_data_update(
        &self,
        user_id: UserId,
        payload: Vec<u8>,
        ttl: Duration,
    ) -> HandoffResult<()> {
        self.set(self.keys.data_update(user_id), payload, ttl).await;
        Ok(())
    }

    async fn take_data_update(&self, user_id: UserId) -> HandoffResult<Option<Vec<u8>>> {
        Ok(self.take(&self.keys.data_update(user_id)).await)
    }
}
