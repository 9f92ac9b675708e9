//! Conversation history
//!
//! A [`ChatHistory`] owns the ordered messages of one session and mirrors
//! every append and clear into a [`HistoryBackend`]: nothing, an in-process
//! map, a Redis list, or a Supabase table.

pub mod backend;
pub mod backends;
pub mod log;
pub mod manager;
pub mod message;
pub mod store;

pub use backend::{connect, BackendResult, HistoryBackend};
pub use backends::{MemoryBackend, NoneBackend, RedisBackend, SupabaseBackend};
pub use log::MessageLog;
pub use manager::{HistoryManager, SharedHistory};
pub use message::{Message, PersistenceRecord, Role};
pub use store::{ChatHistory, Durability, SessionState, SkippedRecord};
