//! Completion services for chatlog
//!
//! A completion service takes the ordered conversation and returns the next
//! assistant message, whole or as a stream of text deltas.

pub mod base;
pub mod openai_compat;
pub mod registry;

pub use base::{
    Completion, CompletionOptions, CompletionService, CompletionStream, ProviderError,
    ProviderResult, StreamEvent, WireMessage,
};
pub use openai_compat::OpenAiCompatClient;
pub use registry::{ProviderRegistry, ProviderSpec};

use chatlog_core::config::Config;

/// Build the client selected by `config.model`, with credentials from `config.providers`
pub fn client_from_config(config: &Config) -> ProviderResult<OpenAiCompatClient> {
    let registry = ProviderRegistry::new();
    let name = config.model.provider.as_str();
    let spec = registry
        .find_by_name(name)
        .ok_or_else(|| ProviderError::ConfigError(format!("unknown provider: {}", name)))?;
    let settings = config.providers.get(&spec.name).cloned().unwrap_or_default();

    let model = Some(config.model.model.clone()).filter(|m| !m.is_empty());
    Ok(OpenAiCompatClient::from_spec(
        spec,
        Some(settings.api_key),
        settings.api_base,
        model,
    )?
    .with_temperature(config.model.temperature)
    .with_max_tokens(config.model.max_tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_from_default_config_targets_ollama() {
        let client = client_from_config(&Config::default()).unwrap();
        assert_eq!(client.api_base(), "http://localhost:11434/v1");
        assert_eq!(client.default_model(), "llama3.2:3b-instruct-q8_0");
    }

    #[test]
    fn test_client_from_config_rejects_unknown_provider() {
        let mut config = Config::default();
        config.model.provider = "mystery".to_string();
        let err = client_from_config(&config).err().unwrap();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_client_from_config_uses_configured_base_and_model() {
        let mut config = Config::default();
        config.model.provider = "gemini".to_string();
        config.model.model = "gemini-1.5-flash".to_string();
        config.providers.gemini.api_key = "g-key".to_string();
        config.providers.gemini.api_base = Some("https://proxy.example/v1".to_string());

        let client = client_from_config(&config).unwrap();
        assert_eq!(client.api_base(), "https://proxy.example/v1");
        assert_eq!(client.default_model(), "gemini-1.5-flash");
    }
}
