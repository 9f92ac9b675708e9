//! Provider registry - single source of truth for provider metadata

use serde::{Deserialize, Serialize};

/// One provider's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Environment variable holding the API key; empty for local servers
    #[serde(default)]
    pub env_key: String,
    /// Lowercase fragments that identify this provider's model names
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub is_local: bool,
    pub default_api_base: String,
    pub default_model: String,
    #[serde(default)]
    pub models: Vec<String>,
}

impl ProviderSpec {
    pub fn label(&self) -> String {
        if !self.display_name.is_empty() {
            return self.display_name.clone();
        }
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Registry of available providers
pub struct ProviderRegistry {
    providers: Vec<ProviderSpec>,
}

impl ProviderRegistry {
    /// Create a new provider registry with default providers
    pub fn new() -> Self {
        Self {
            providers: Self::default_providers(),
        }
    }

    /// Get all provider specs
    pub fn all(&self) -> &[ProviderSpec] {
        &self.providers
    }

    /// Find a provider by config field name
    pub fn find_by_name(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
    }

    /// Find a provider by model name: exact model list match first, then keywords
    pub fn find_by_model(&self, model: &str) -> Option<&ProviderSpec> {
        let model_lower = model.to_lowercase();
        self.providers
            .iter()
            .find(|spec| spec.models.iter().any(|m| m.eq_ignore_ascii_case(model)))
            .or_else(|| {
                self.providers
                    .iter()
                    .find(|spec| spec.keywords.iter().any(|kw| model_lower.contains(kw)))
            })
    }

    fn default_providers() -> Vec<ProviderSpec> {
        let yaml = include_str!("providers.yaml");
        serde_yaml::from_str(yaml).expect("Failed to parse default providers configuration")
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
