//! One conversational turn at a time over a [`ChatHistory`]

use chatlog_core::history::{ChatHistory, Durability, Message};
use chatlog_core::Error as HistoryError;
use chatlog_providers::{
    Completion, CompletionOptions, CompletionService, ProviderError, StreamEvent,
};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Events emitted while a streamed reply is produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A piece of the assistant reply, in arrival order
    Delta { text: String },
    /// The full reply, sent once after the last delta
    Completed { reply: String },
}

/// Why a turn did not produce a reply
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("completion failed: {0}")]
    Completion(#[from] ProviderError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("turn cancelled")]
    Cancelled,
}

/// Outcome of a successful turn
#[derive(Debug)]
pub struct TurnReport {
    pub reply: String,
    /// Writes that failed under best-effort durability. The messages are
    /// still in the in-memory log but not in the backend.
    pub write_failures: Vec<HistoryError>,
}

impl TurnReport {
    pub fn is_fully_persisted(&self) -> bool {
        self.write_failures.is_empty()
    }
}

/// Drives turns: append the human message, ask the service, append the reply
pub struct Conversation {
    service: Arc<dyn CompletionService>,
    options: CompletionOptions,
    system_prompt: Option<String>,
}

impl Conversation {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            options: CompletionOptions::default(),
            system_prompt: None,
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// System prompt written at the start of an empty history
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = Some(prompt).filter(|p| !p.trim().is_empty());
        self
    }

    pub fn model(&self) -> String {
        self.options
            .model
            .clone()
            .unwrap_or_else(|| self.service.default_model())
    }

    /// Invoke the service once on a fixed message list, without any history
    pub async fn ask(&self, messages: &[Message]) -> Result<Completion, TurnError> {
        debug!("One-shot completion over {} messages", messages.len());
        Ok(self.service.complete(messages, &self.options).await?)
    }

    /// Run one turn and wait for the whole reply.
    ///
    /// The human message is kept in the history even when the completion
    /// fails, so a later turn sees what was asked.
    pub async fn send(
        &self,
        history: &mut ChatHistory,
        input: &str,
    ) -> Result<TurnReport, TurnError> {
        let mut write_failures = self.begin_turn(history, input).await?;

        let completion = self
            .service
            .complete(&history.messages(), &self.options)
            .await?;

        self.finish_turn(history, completion, &mut write_failures)
            .await
            .map(|reply| TurnReport {
                reply,
                write_failures,
            })
    }

    /// Run one turn, forwarding reply deltas to `events` as they arrive.
    ///
    /// Cancelling `cancel` abandons the turn: the human message stays, no
    /// partial assistant message is recorded.
    pub async fn send_streaming(
        &self,
        history: &mut ChatHistory,
        input: &str,
        events: Option<&mpsc::UnboundedSender<ChatEvent>>,
        cancel: &CancellationToken,
    ) -> Result<TurnReport, TurnError> {
        let mut write_failures = self.begin_turn(history, input).await?;
        let messages = history.messages();

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Self::cancelled(history)),
            result = self.service.complete_stream(&messages, &self.options) => result?,
        };

        let mut streamed = String::new();
        let mut completed: Option<Completion> = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Self::cancelled(history)),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(StreamEvent::TextDelta(text))) => {
                    streamed.push_str(&text);
                    if let Some(tx) = events {
                        let _ = tx.send(ChatEvent::Delta { text });
                    }
                }
                Some(Ok(StreamEvent::Completed(done))) => {
                    completed = Some(done);
                    break;
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        // Streams that end without a Completed event still produced a reply
        let completion = completed.unwrap_or_else(|| Completion {
            content: streamed,
            ..Completion::default()
        });

        let reply = self
            .finish_turn(history, completion, &mut write_failures)
            .await?;
        if let Some(tx) = events {
            let _ = tx.send(ChatEvent::Completed {
                reply: reply.clone(),
            });
        }
        Ok(TurnReport {
            reply,
            write_failures,
        })
    }

    async fn begin_turn(
        &self,
        history: &mut ChatHistory,
        input: &str,
    ) -> Result<Vec<HistoryError>, TurnError> {
        let mut write_failures = Vec::new();
        if history.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                record(history, Message::system(prompt.clone()), &mut write_failures).await?;
            }
        }
        record(history, Message::human(input), &mut write_failures).await?;
        info!(
            "Turn started in session {} (model: {})",
            history.session_id(),
            self.model()
        );
        Ok(write_failures)
    }

    async fn finish_turn(
        &self,
        history: &mut ChatHistory,
        completion: Completion,
        write_failures: &mut Vec<HistoryError>,
    ) -> Result<String, TurnError> {
        let reply = completion.content.clone();
        record(history, completion.into_message(), write_failures).await?;

        let preview = if reply.chars().count() > 120 {
            format!("{}...", reply.chars().take(120).collect::<String>())
        } else {
            reply.clone()
        };
        info!("Reply in session {}: {}", history.session_id(), preview);
        Ok(reply)
    }

    fn cancelled(history: &ChatHistory) -> TurnError {
        info!("Turn cancelled in session {}", history.session_id());
        TurnError::Cancelled
    }
}

/// Append a message, downgrading best-effort write failures to a report entry
async fn record(
    history: &mut ChatHistory,
    message: Message,
    write_failures: &mut Vec<HistoryError>,
) -> Result<(), TurnError> {
    match history.add_message(message).await {
        Ok(()) => Ok(()),
        Err(err @ HistoryError::BackendWrite(_))
            if history.durability() == Durability::BestEffort =>
        {
            warn!(
                "Continuing without persistence in session {}: {}",
                history.session_id(),
                err
            );
            write_failures.push(err);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
