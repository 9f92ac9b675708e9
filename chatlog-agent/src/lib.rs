//! Conversation driver: history in, completion out, history updated

pub mod conversation;

pub use conversation::{ChatEvent, Conversation, TurnError, TurnReport};
