//! Core types for chatlog
//!
//! Conversation history with pluggable persistence, plus the configuration,
//! logging and error types shared by the other chatlog crates.

pub mod config;
pub mod error;
pub mod history;
pub mod logging;

pub use error::{BackendError, Error, Result};
