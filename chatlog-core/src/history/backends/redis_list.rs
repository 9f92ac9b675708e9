//! Redis list backend
//!
//! Each session maps to one Redis list; records are pushed to the tail and
//! read back with a full range read.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use crate::config::RedisConfig;
use crate::error::BackendError;
use crate::history::backend::{BackendResult, HistoryBackend};
use crate::history::message::PersistenceRecord;

/// History stored in Redis lists
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
    key_prefix: String,
    max_messages: Option<usize>,
}

impl RedisBackend {
    /// Connect and check the server answers `PING`
    pub async fn connect(config: &RedisConfig) -> BackendResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        debug!("Redis answered {} at {}", pong, config.url);

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
            max_messages: config.max_messages,
        })
    }

    fn key(&self, session_id: &str) -> String {
        list_key(&self.key_prefix, session_id)
    }
}

fn list_key(prefix: &str, session_id: &str) -> String {
    format!("{}{}", prefix, session_id)
}

/// `LTRIM` start index keeping only the newest `max` entries
fn trim_start(max: usize) -> isize {
    -(isize::try_from(max).unwrap_or(isize::MAX))
}

#[async_trait]
impl HistoryBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn load(&self, session_id: &str) -> BackendResult<Vec<PersistenceRecord>> {
        let key = self.key(session_id);
        let mut conn = self.conn.clone();

        let _: () = conn.ltrim(&key, 0, -1).await?;
        let payloads: Vec<String> = conn.lrange(&key, 0, -1).await?;
        debug!("Loaded {} records from redis list {}", payloads.len(), key);

        Ok(payloads
            .into_iter()
            .map(PersistenceRecord::from_payload)
            .collect())
    }

    async fn append(&self, session_id: &str, record: &PersistenceRecord) -> BackendResult<()> {
        let key = self.key(session_id);
        let mut conn = self.conn.clone();

        let _: () = conn.rpush(&key, record.payload()).await?;
        if let Some(max) = self.max_messages.filter(|max| *max > 0) {
            let _: () = conn.ltrim(&key, trim_start(max), -1).await?;
        }
        Ok(())
    }

    async fn delete_all(&self, session_id: &str) -> BackendResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key(session_id)).await?;
        Ok(())
    }
}
