//! Redis handoff relay
//!
//! Values are written with `SET key value PX ttl` and consumed with
//! `GETDEL`, which needs Redis 6.2 or newer.

use super::{handoff_error, HandoffChannel, HandoffKeys, HandoffResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use statehop_core::errors::SyncError;
use statehop_core_types::{SnapshotId, UserId};
use std::time::Duration;

pub struct RedisHandoff {
    keys: HandoffKeys,
    conn: MultiplexedConnection,
}

fn redis_error(op: &str, err: redis::RedisError) -> SyncError {
    handoff_error(op, err.to_string())
}

impl RedisHandoff {
    /// Connect to `url` and verify the server answers
    ///
    /// # Errors
    ///
    /// `Handoff` if the URL is malformed or the server is unreachable.
    pub async fn connect(url: &str, cluster: &str) -> HandoffResult<Self> {
        let client = redis::Client::open(url).map_err(|e| redis_error("connect", e))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| redis_error("connect", e))?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| redis_error("connect", e))?;
        tracing::info!(cluster, "connected to redis handoff relay");
        Ok(Self {
            keys: HandoffKeys::new(cluster),
            conn,
        })
    }

    async fn set(&self, op: &str, key: String, value: Vec<u8>, ttl: Duration) -> HandoffResult<()> {
        let mut conn = self.conn.clone();
        let ttl_ms = ttl.as_millis().max(1) as u64;
        redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| redis_error(op, e))
    }

    async fn take(&self, op: &str, key: String) -> HandoffResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        redis::cmd("GETDEL")
            .arg(&key)
            .query_async::<_, Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| redis_error(op, e))
    }
}

#[async_trait]
impl HandoffChannel for RedisHandoff {
    async fn set_server_switch(
        &self,
        user_id: UserId,
        snapshot_id: SnapshotId,
        ttl: Duration,
    ) -> HandoffResult<()> {
        self.set(
            "set_server_switch",
            self.keys.server_switch(user_id),
            snapshot_id.to_string().into_bytes(),
            ttl,
        )
        .await
    }

    async fn take_server_switch(&self, user_id: UserId) -> HandoffResult<Option<SnapshotId>> {
        self.take("take_server_switch", self.keys.server_switch(user_id))
            .await?
            .map(|bytes| super::parse_marker("take_server_switch", &bytes))
            .transpose()
    }

    async fn set_data_update(
        &self,
        user_id: UserId,
        payload: Vec<u8>,
        ttl: Duration,
    ) -> HandoffResult<()> {
        self.set("set_data_update", self.keys.data_update(user_id), payload, ttl)
            .await
    }

    async fn take_data_update(&self, user_id: UserId) -> HandoffResult<Option<Vec<u8>>> {
        self.take("take_data_update", self.keys.data_update(user_id))
            .await
    }
}
