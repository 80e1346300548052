//! Redis-backed conversation store
//!
//! Each session key maps to one Redis string holding the JSON-encoded message
//! list. The connection manager reconnects transparently; individual command
//! failures surface as [`StoreError::Backend`].

use super::{truncate_to_limit, ConversationStore, Message, StoreError};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::time::Duration;

pub struct RedisStore {
    conn: ConnectionManager,
    limit: usize,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379/0`), with a
    /// per-command response deadline.
    pub async fn connect(url: &str, limit: usize, timeout_secs: u64) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager_config = ConnectionManagerConfig::new()
            .set_response_timeout(Duration::from_secs(timeout_secs));
        let conn = ConnectionManager::new_with_config(client, manager_config).await?;
        tracing::info!("Connected to conversation store at {url}");
        Ok(Self { conn, limit })
    }
}

#[async_trait]
impl ConversationStore for RedisStore {
    async fn load(&self, key: &str) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, key: &str, mut conversation: Vec<Message>) -> Result<(), StoreError> {
        truncate_to_limit(&mut conversation, self.limit);
        let data = serde_json::to_string(&conversation)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, data).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
