//! Backend that keeps nothing

use async_trait::async_trait;

use crate::history::backend::{BackendResult, HistoryBackend};
use crate::history::message::PersistenceRecord;

/// Non-persistent backend: history lives only in the session's memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneBackend;

#[async_trait]
impl HistoryBackend for NoneBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn load(&self, _session_id: &str) -> BackendResult<Vec<PersistenceRecord>> {
        Ok(Vec::new())
    }

    async fn append(&self, _session_id: &str, _record: &PersistenceRecord) -> BackendResult<()> {
        Ok(())
    }

    async fn delete_all(&self, _session_id: &str) -> BackendResult<()> {
        Ok(())
    }
}
