//! Process-local backend

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::history::backend::{BackendResult, HistoryBackend};
use crate::history::message::PersistenceRecord;

/// Keeps records in a map shared by every clone of the backend.
///
/// Records outlive any single `ChatHistory` but not the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    sessions: Arc<Mutex<HashMap<String, Vec<PersistenceRecord>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload as-is, bypassing message encoding
    pub fn insert_raw(&self, session_id: &str, payload: impl Into<String>) {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(PersistenceRecord::from_payload(payload));
    }

    /// Number of records stored for a session
    pub fn record_count(&self, session_id: &str) -> usize {
        self.sessions
            .lock()
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl HistoryBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, session_id: &str) -> BackendResult<Vec<PersistenceRecord>> {
        Ok(self
            .sessions
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, record: &PersistenceRecord) -> BackendResult<()> {
        self.sessions
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn delete_all(&self, session_id: &str) -> BackendResult<()> {
        self.sessions.lock().remove(session_id);
        Ok(())
    }
}
