//! Persistence backend contract

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::backends::{MemoryBackend, NoneBackend, RedisBackend, SupabaseBackend};
use super::message::PersistenceRecord;
use crate::config::{BackendKind, HistoryConfig};
use crate::error::BackendError;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Storage for the records of many sessions, keyed by session identifier.
///
/// Implementations must return records from `load` in the order they were
/// appended.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;

    /// All records stored for a session, oldest first
    async fn load(&self, session_id: &str) -> BackendResult<Vec<PersistenceRecord>>;

    /// Append one record to the end of a session
    async fn append(&self, session_id: &str, record: &PersistenceRecord) -> BackendResult<()>;

    /// Remove every record of a session
    async fn delete_all(&self, session_id: &str) -> BackendResult<()>;
}

/// Build the backend selected in the configuration.
///
/// Remote backends are contacted here, so an unreachable store is reported
/// before any message is exchanged.
pub async fn connect(config: &HistoryConfig) -> crate::Result<Arc<dyn HistoryBackend>> {
    let backend: Arc<dyn HistoryBackend> = match config.backend {
        BackendKind::None => Arc::new(NoneBackend),
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::Redis => Arc::new(
            RedisBackend::connect(&config.redis)
                .await
                .map_err(crate::Error::BackendUnavailable)?,
        ),
        BackendKind::Supabase => Arc::new(
            SupabaseBackend::connect(&config.supabase)
                .await
                .map_err(crate::Error::BackendUnavailable)?,
        ),
    };

    info!("History backend ready: {}", backend.name());
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[tokio::test]
    async fn test_connect_local_backends() {
        let mut config = HistoryConfig::default();
        config.backend = BackendKind::None;
        assert_eq!(connect(&config).await.unwrap().name(), "none");

        config.backend = BackendKind::Memory;
        assert_eq!(connect(&config).await.unwrap().name(), "memory");
    }

    #[tokio::test]
    async fn test_connect_unreachable_redis_fails() {
        let mut config = HistoryConfig::default();
        config.backend = BackendKind::Redis;
        config.redis = RedisConfig {
            url: "redis://127.0.0.1:1/0".to_string(),
            ..RedisConfig::default()
        };

        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, crate::Error::BackendUnavailable(_)));
    }
}
