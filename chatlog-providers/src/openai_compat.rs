//! OpenAI-compatible chat completions client
//!
//! Ollama, Gemini, OpenAI and Groq all expose `POST {base}/chat/completions`
//! with the same request shape and SSE streaming, so one client covers them.

use async_trait::async_trait;
use chatlog_core::history::Message;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::base::{
    Completion, CompletionOptions, CompletionService, CompletionStream, ProviderError,
    ProviderResult, StreamEvent, WireMessage,
};
use crate::registry::ProviderSpec;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

impl Usage {
    fn into_map(self) -> HashMap<String, i64> {
        HashMap::from([
            ("prompt_tokens".to_string(), self.prompt_tokens),
            ("completion_tokens".to_string(), self.completion_tokens),
            ("total_tokens".to_string(), self.total_tokens),
        ])
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible endpoint
pub struct OpenAiCompatClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiCompatClient {
    /// Create a new client
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, default_model: String) -> Self {
        Self {
            client: Client::builder()
                .http1_only() // some local servers misbehave on HTTP/2 upgrades
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            default_model,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Create a client from a registry entry, applying configured overrides
    pub fn from_spec(
        spec: &ProviderSpec,
        api_key: Option<String>,
        api_base: Option<String>,
        model: Option<String>,
    ) -> ProviderResult<Self> {
        let api_key = api_key.filter(|key| !key.trim().is_empty());
        if !spec.is_local && api_key.is_none() {
            return Err(ProviderError::ConfigError(format!(
                "{} needs an API key (set {})",
                spec.label(),
                spec.env_key
            )));
        }

        let api_base = api_base
            .filter(|base| !base.trim().is_empty())
            .unwrap_or_else(|| spec.default_api_base.clone());
        let model = model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| spec.default_model.clone());

        Ok(Self::new(api_base, api_key, model))
    }

    /// Default sampling temperature for requests that don't set one
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Default token limit for requests that don't set one
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        stream: bool,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: messages.iter().map(WireMessage::from).collect(),
            stream: if stream { Some(true) } else { None },
            max_tokens: options.max_tokens.or(self.max_tokens),
            temperature: options.temperature.or(self.temperature),
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> ProviderResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(
            "Sending chat request to {} with model {} (stream: {})",
            url,
            request.model,
            request.stream.unwrap_or(false)
        );

        let mut req_builder = self.client.post(&url).json(request);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }
        Ok(response)
    }

    fn parse_response(response: ChatCompletionResponse) -> ProviderResult<Completion> {
        let ChatCompletionResponse { choices, usage } = response;
        let choice = choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: usage.into_map(),
        })
    }
}

/// Accumulates stream chunks into the final completion
#[derive(Default)]
struct StreamState {
    content: String,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl StreamState {
    /// Apply one chunk; returns the text delta it carried, if any
    fn apply(&mut self, chunk: StreamChunk) -> Option<String> {
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        let choice = chunk.choices.into_iter().next()?;
        if choice.finish_reason.is_some() {
            self.finish_reason = choice.finish_reason;
        }
        let delta = choice.delta.content.filter(|text| !text.is_empty())?;
        self.content.push_str(&delta);
        Some(delta)
    }

    fn finish(self) -> Completion {
        Completion {
            content: self.content,
            finish_reason: self.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: self.usage.map(Usage::into_map).unwrap_or_default(),
        }
    }
}

/// Decode an SSE body into stream events on `tx`.
///
/// The reply counts as complete on `data: [DONE]` or once a chunk carried a
/// finish reason. A body that ends before either is reported as an error, so
/// a cut-off reply never reaches the history.
async fn forward_sse<S, B, E>(bytes: S, tx: mpsc::UnboundedSender<ProviderResult<StreamEvent>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut events = std::pin::pin!(bytes.eventsource());
    let mut state = StreamState::default();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                let _ = tx.send(Err(ProviderError::InvalidResponse(format!(
                    "stream interrupted: {}",
                    err
                ))));
                return;
            }
        };

        let payload = event.data.trim();
        if payload.is_empty() {
            continue;
        }
        if payload == "[DONE]" {
            let _ = tx.send(Ok(StreamEvent::Completed(state.finish())));
            return;
        }

        let parsed = match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx.send(Err(ProviderError::JsonError(err)));
                return;
            }
        };

        if let Some(delta) = state.apply(parsed) {
            if tx.send(Ok(StreamEvent::TextDelta(delta))).is_err() {
                // receiver dropped: the caller cancelled
                return;
            }
        }
    }

    if state.finish_reason.is_some() {
        let _ = tx.send(Ok(StreamEvent::Completed(state.finish())));
    } else {
        warn!(
            "Stream closed after {} bytes of reply without a finish marker",
            state.content.len()
        );
        let _ = tx.send(Err(ProviderError::InvalidResponse(
            "stream ended before the reply was complete".to_string(),
        )));
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> ProviderResult<Completion> {
        let request = self.build_request(messages, options, false);
        let response = self.send(&request).await?;
        let response_data: ChatCompletionResponse = response.json().await?;
        Self::parse_response(response_data)
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> ProviderResult<CompletionStream> {
        let request = self.build_request(messages, options, true);
        let response = self.send(&request).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_sse(response.bytes_stream(), tx));

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;
    use futures::stream;
    use mockito::Matcher;

    fn math_messages() -> Vec<Message> {
        vec![
            Message::system("Solve the following math problems"),
            Message::human("What is 81 divided by 9?"),
        ]
    }

    #[test]
    fn test_build_request_prefers_options() {
        let client = OpenAiCompatClient::new("http://localhost:11434/v1/", None, "llama3.2".into())
            .with_temperature(0.4);
        assert_eq!(client.api_base(), "http://localhost:11434/v1");

        let request = client.build_request(&math_messages(), &CompletionOptions::default(), false);
        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.temperature, Some(0.4));
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");

        let options = CompletionOptions {
            model: Some("gemini-1.5-flash".to_string()),
            temperature: Some(0.0),
            max_tokens: Some(64),
        };
        let request = client.build_request(&math_messages(), &options, true);
        assert_eq!(request.model, "gemini-1.5-flash");
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.stream, Some(true));
    }

    #[test]
    fn test_from_spec_requires_key_for_hosted_providers() {
        let registry = ProviderRegistry::new();
        let gemini = registry.find_by_name("gemini").unwrap();
        assert!(OpenAiCompatClient::from_spec(gemini, None, None, None).is_err());

        let client =
            OpenAiCompatClient::from_spec(gemini, Some("g-key".to_string()), None, None).unwrap();
        assert_eq!(client.default_model(), gemini.default_model);

        let ollama = registry.find_by_name("ollama").unwrap();
        let client = OpenAiCompatClient::from_spec(ollama, None, None, None).unwrap();
        assert_eq!(client.api_base(), "http://localhost:11434/v1");
    }

    #[tokio::test]
    async fn test_complete() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "llama3.2",
                "messages": [
                    {"role": "system", "content": "Solve the following math problems"},
                    {"role": "user", "content": "What is 81 divided by 9?"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"9"},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":20,"completion_tokens":1,"total_tokens":21}}"#,
            )
            .create_async()
            .await;

        let client =
            OpenAiCompatClient::new(server.url(), Some("test-key".to_string()), "llama3.2".into());
        let completion = client
            .complete(&math_messages(), &CompletionOptions::default())
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(completion.content, "9");
        assert_eq!(completion.usage.get("total_tokens"), Some(&21));
    }

    #[tokio::test]
    async fn test_complete_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(404)
            .with_body(r#"{"error":"model 'nope' not found"}"#)
            .create_async()
            .await;

        let client = OpenAiCompatClient::new(server.url(), None, "nope".into());
        let err = client
            .complete(&math_messages(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ApiError(ref msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_complete_stream() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"8\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"1 / 9 = 9\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = OpenAiCompatClient::new(server.url(), None, "llama3.2".into());
        let mut stream = client
            .complete_stream(&math_messages(), &CompletionOptions::default())
            .await
            .unwrap();

        let mut deltas = Vec::new();
        let mut completed = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::TextDelta(text) => deltas.push(text),
                StreamEvent::Completed(done) => completed = Some(done),
            }
        }

        assert_eq!(deltas, vec!["8", "1 / 9 = 9"]);
        let completed = completed.unwrap();
        assert_eq!(completed.content, deltas.concat());
        assert_eq!(completed.finish_reason, "stop");
    }

    async fn collect_sse(chunks: Vec<Vec<u8>>) -> Vec<ProviderResult<StreamEvent>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
        forward_sse(body, tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_stream_keeps_characters_split_across_chunks() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = event.as_bytes();
        // cut between the two bytes of 'é'
        let split = event.find('é').unwrap() + 1;

        let events = collect_sse(vec![bytes[..split].to_vec(), bytes[split..].to_vec()]).await;

        let mut deltas = String::new();
        let mut completed = None;
        for event in events {
            match event.unwrap() {
                StreamEvent::TextDelta(text) => deltas.push_str(&text),
                StreamEvent::Completed(done) => completed = Some(done),
            }
        }
        assert_eq!(deltas, "café");
        assert_eq!(completed.unwrap().content, "café");
    }

    #[tokio::test]
    async fn test_stream_without_finish_marker_is_an_error() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"The answer is\"}}]}\n\n";

        let events = collect_sse(vec![body.as_bytes().to_vec()]).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(StreamEvent::TextDelta(ref text)) if text == "The answer is"));
        assert!(matches!(events[1], Err(ProviderError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_stream_finish_reason_without_done_completes() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"9\"},\"finish_reason\":\"stop\"}]}\n\n",
        );

        let events = collect_sse(vec![body.as_bytes().to_vec()]).await;

        match events.last() {
            Some(Ok(StreamEvent::Completed(done))) => {
                assert_eq!(done.content, "9");
                assert_eq!(done.finish_reason, "stop");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }
}
