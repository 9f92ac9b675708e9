//! History store adapter: a session's message log bound to a backend

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::HistoryBackend;
use super::log::MessageLog;
use super::message::{Message, PersistenceRecord};
use crate::error::{BackendError, Error};

/// What happens to the in-memory log when a backend write fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Keep the message in memory and report the failed write
    #[default]
    BestEffort,
    /// Roll the message back out of memory and report the failed write
    Strict,
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    /// The backend could not be read at construction. Terminal.
    Failed,
}

/// A stored record that was dropped while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position in backend order
    pub index: usize,
    /// Why decoding failed
    pub reason: String,
}

impl From<&SkippedRecord> for Error {
    fn from(skipped: &SkippedRecord) -> Self {
        Error::RecordDecode {
            index: skipped.index,
            reason: skipped.reason.clone(),
        }
    }
}

/// Conversation history of one session.
///
/// The in-memory log is the source of truth for the running process; the
/// backend provides durability according to the chosen [`Durability`].
pub struct ChatHistory {
    session_id: String,
    log: MessageLog,
    backend: Arc<dyn HistoryBackend>,
    durability: Durability,
    state: SessionState,
    skipped: Vec<SkippedRecord>,
}

impl ChatHistory {
    /// Open a session, loading whatever the backend holds for it.
    ///
    /// Records that fail to decode are skipped and reported through
    /// [`ChatHistory::skipped_records`]. A backend that cannot be read fails
    /// the whole open with [`Error::BackendUnavailable`].
    pub async fn open(
        session_id: impl Into<String>,
        backend: Arc<dyn HistoryBackend>,
        durability: Durability,
    ) -> crate::Result<Self> {
        let mut history = Self {
            session_id: session_id.into(),
            log: MessageLog::new(),
            backend,
            durability,
            state: SessionState::Uninitialized,
            skipped: Vec::new(),
        };
        history.load().await?;
        Ok(history)
    }

    async fn load(&mut self) -> crate::Result<()> {
        self.state = SessionState::Loading;
        debug!(
            "Loading session {} from {}",
            self.session_id,
            self.backend.name()
        );

        let records = match self.backend.load(&self.session_id).await {
            Ok(records) => records,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(Error::BackendUnavailable(e));
            }
        };

        for (index, record) in records.iter().enumerate() {
            match record.decode() {
                Ok(message) => self.log.append(message),
                Err(reason) => {
                    warn!(
                        "Skipping record {} of session {}: {}",
                        index, self.session_id, reason
                    );
                    self.skipped.push(SkippedRecord { index, reason });
                }
            }
        }

        self.state = SessionState::Ready;
        info!(
            "Session {} ready with {} messages ({} skipped)",
            self.session_id,
            self.log.len(),
            self.skipped.len()
        );
        Ok(())
    }

    /// Append a message and persist it.
    ///
    /// On a failed write this returns [`Error::BackendWrite`]. With
    /// [`Durability::BestEffort`] the message stays in the log; with
    /// [`Durability::Strict`] it has been removed again.
    pub async fn add_message(&mut self, message: Message) -> crate::Result<()> {
        let record = PersistenceRecord::encode(&message)?;
        self.log.append(message);

        if let Err(e) = self.backend.append(&self.session_id, &record).await {
            warn!(
                "Failed to persist message for session {} to {}: {}",
                self.session_id,
                self.backend.name(),
                e
            );
            if self.durability == Durability::Strict {
                self.log.pop();
            }
            return Err(Error::BackendWrite(e));
        }
        Ok(())
    }

    /// Append and persist a human message
    pub async fn add_user_message(&mut self, content: impl Into<String>) -> crate::Result<()> {
        self.add_message(Message::human(content)).await
    }

    /// Append and persist an assistant message
    pub async fn add_ai_message(&mut self, content: impl Into<String>) -> crate::Result<()> {
        self.add_message(Message::assistant(content)).await
    }

    /// Append and persist a system message
    pub async fn add_system_message(&mut self, content: impl Into<String>) -> crate::Result<()> {
        self.add_message(Message::system(content)).await
    }

    /// Empty the log and delete the session's records.
    ///
    /// The in-memory log is emptied even if the backend delete fails.
    pub async fn clear(&mut self) -> crate::Result<()> {
        self.log.clear();
        self.skipped.clear();
        self.backend
            .delete_all(&self.session_id)
            .await
            .map_err(|e: BackendError| {
                warn!("Failed to clear session {}: {}", self.session_id, e);
                Error::BackendWrite(e)
            })?;
        info!("Session {} cleared", self.session_id);
        Ok(())
    }

    /// Ordered copy of the conversation so far
    pub fn messages(&self) -> Vec<Message> {
        self.log.snapshot()
    }

    /// The underlying log
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Records that could not be decoded at load time
    pub fn skipped_records(&self) -> &[SkippedRecord] {
        &self.skipped
    }
}

impl std::fmt::Debug for ChatHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHistory")
            .field("session_id", &self.session_id)
            .field("backend", &self.backend.name())
            .field("messages", &self.log.len())
            .field("durability", &self.durability)
            .field("state", &self.state)
            .finish()
    }
}
