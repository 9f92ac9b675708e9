//! Configuration management
//!
//! Handles loading and validation of chatlog configuration from files,
//! `.env` and environment variables.

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::ConfigLoader;
pub use schema::*;
