//! Base trait for completion services

use async_trait::async_trait;
use chatlog_core::history::{Message, Role};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;

/// Error type for provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

pub type CompletionStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamEvent>> + Send>>;

/// Per-request knobs
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Overrides the service's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A finished completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default = "default_finish_reason")]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: HashMap<String, i64>,
}

fn default_finish_reason() -> String {
    "stop".to_string()
}

impl Completion {
    /// The completion as an assistant message
    pub fn into_message(self) -> Message {
        Message::assistant(self.content)
    }
}

/// Streaming event emitted by completion services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental assistant text
    TextDelta(String),
    /// Final completed response; its content is the concatenation of all deltas
    Completed(Completion),
}

/// A message in the shape chat-completion APIs expect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let role = match message.role() {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: message.content.clone(),
        }
    }
}

/// Something that turns a conversation into the next assistant message
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce the whole response at once
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> ProviderResult<Completion>;

    /// Produce the response as a stream of text deltas followed by `Completed`.
    ///
    /// Default behavior falls back to `complete` and emits one text delta.
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> ProviderResult<CompletionStream> {
        let response = self.complete(messages, options).await?;

        let mut events = Vec::new();
        if !response.content.is_empty() {
            events.push(Ok(StreamEvent::TextDelta(response.content.clone())));
        }
        events.push(Ok(StreamEvent::Completed(response)));

        Ok(Box::pin(stream::iter(events)))
    }

    /// Get the default model for this service
    fn default_model(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Echo;

    #[async_trait]
    impl CompletionService for Echo {
        async fn complete(
            &self,
            messages: &[Message],
            _options: &CompletionOptions,
        ) -> ProviderResult<Completion> {
            Ok(Completion {
                content: messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
                ..Completion::default()
            })
        }

        fn default_model(&self) -> String {
            "echo".to_string()
        }
    }

    #[test]
    fn test_wire_roles() {
        let roles: Vec<String> = [
            Message::system("s"),
            Message::human("h"),
            Message::assistant("a"),
        ]
        .iter()
        .map(|m| WireMessage::from(m).role)
        .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[tokio::test]
    async fn test_default_stream_falls_back_to_complete() {
        let messages = vec![Message::human("ping")];
        let mut stream = Echo
            .complete_stream(&messages, &CompletionOptions::default())
            .await
            .unwrap();

        let mut deltas = String::new();
        let mut completed = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::TextDelta(text) => deltas.push_str(&text),
                StreamEvent::Completed(done) => completed = Some(done),
            }
        }
        assert_eq!(deltas, "ping");
        assert_eq!(completed.unwrap().content, "ping");
    }
}
