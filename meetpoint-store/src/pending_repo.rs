use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;
use uuid::Uuid;

use meetpoint_core::{PendingKind, PendingRecord, PendingStore, StoreError};

/// Redis-backed side-channel store. `SET NX EX` gives the
/// get-or-create-exclusive lease; expiry is left to the server, so an
/// expired record simply stops existing.
pub struct RedisPendingStore {
    client: redis::Client,
}

impl RedisPendingStore {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    fn key(kind: PendingKind, booking_id: Uuid) -> String {
        format!("pending:{}:{}", kind.as_str(), booking_id)
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis)
    }
}

fn map_redis(e: redis::RedisError) -> StoreError {
    StoreError::Transport(e.to_string())
}

#[async_trait]
impl PendingStore for RedisPendingStore {
    async fn put_if_absent(
        &self,
        kind: PendingKind,
        booking_id: Uuid,
        record: &PendingRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let payload =
            serde_json::to_string(record).map_err(|e| StoreError::Transport(e.to_string()))?;
        let mut conn = self.conn().await?;
        let key = Self::key(kind, booking_id);

        // SET NX: only set if the key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(map_redis)?;

        Ok(result.is_some())
    }

    async fn get(
        &self,
        kind: PendingKind,
        booking_id: Uuid,
    ) -> Result<Option<PendingRecord>, StoreError> {
        let mut conn = self.conn().await?;
        let key = Self::key(kind, booking_id);
        let raw: Option<String> = conn.get(&key).await.map_err(map_redis)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        // Records are disposable hints: anything unreadable or filed under
        // the wrong namespace is treated as absent, at worst causing a
        // re-prompt.
        match serde_json::from_str::<PendingRecord>(&raw) {
            Ok(record) if record.kind() == kind => Ok(Some(record)),
            Ok(record) => {
                warn!(
                    "Record under {} carries kind {:?}, ignoring it",
                    key,
                    record.kind()
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Undecodable record under {}: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn delete(&self, kind: PendingKind, booking_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let key = Self::key(kind, booking_id);
        let _: () = conn.del(&key).await.map_err(map_redis)?;
        Ok(())
    }
}
