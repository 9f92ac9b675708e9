//! Chat message types and their persisted form

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Instructions that frame the conversation
    #[serde(rename = "system")]
    System,
    /// The person talking to the model
    #[serde(rename = "human", alias = "user")]
    Human,
    /// The model
    #[serde(rename = "ai", alias = "assistant")]
    Assistant,
}

impl Role {
    /// Tag used in persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "ai",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    role: Role,
    /// Message content, stored as-is
    pub content: String,
    /// Free-form metadata carried through persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    /// Create a message with an explicit role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a human message
    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The message role; fixed at construction
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Serialized form of one message as held by a backend.
///
/// The payload is a JSON object of the shape
/// `{"type": "human", "content": "...", "metadata": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceRecord {
    payload: String,
}

impl PersistenceRecord {
    /// Encode a message
    pub fn encode(message: &Message) -> crate::Result<Self> {
        Ok(Self {
            payload: serde_json::to_string(message)?,
        })
    }

    /// Wrap a payload read back from a backend
    pub fn from_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Raw JSON payload
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Decode back into a message
    pub fn decode(&self) -> std::result::Result<Message, String> {
        serde_json::from_str::<Message>(&self.payload).map_err(|e| e.to_string())
    }
}
