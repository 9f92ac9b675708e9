//! Session manager for handling multiple sessions

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::backend::HistoryBackend;
use super::store::{ChatHistory, Durability};

/// Handle to one open session. Holding the lock serializes every operation on it.
pub type SharedHistory = Arc<Mutex<ChatHistory>>;

/// Opens sessions against one backend and keeps them cached by identifier
pub struct HistoryManager {
    backend: Arc<dyn HistoryBackend>,
    durability: Durability,
    cache: Mutex<HashMap<String, SharedHistory>>,
}

impl HistoryManager {
    /// Create a new manager over a backend
    pub fn new(backend: Arc<dyn HistoryBackend>, durability: Durability) -> Self {
        Self {
            backend,
            durability,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get a cached session or open it from the backend
    pub async fn open(&self, session_id: &str) -> crate::Result<SharedHistory> {
        let mut cache = self.cache.lock().await;
        if let Some(existing) = cache.get(session_id) {
            return Ok(Arc::clone(existing));
        }

        let history =
            ChatHistory::open(session_id, Arc::clone(&self.backend), self.durability).await?;
        let shared = Arc::new(Mutex::new(history));
        cache.insert(session_id.to_string(), Arc::clone(&shared));
        debug!("Cached session {}", session_id);
        Ok(shared)
    }

    /// Get a session if it is already open
    pub async fn get(&self, session_id: &str) -> Option<SharedHistory> {
        self.cache.lock().await.get(session_id).cloned()
    }

    /// Drop a session from the cache; its stored records are untouched
    pub async fn evict(&self, session_id: &str) -> bool {
        self.cache.lock().await.remove(session_id).is_some()
    }

    /// Identifiers of the open sessions, sorted
    pub async fn sessions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
