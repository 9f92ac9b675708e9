//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::history::Durability;

/// Root configuration for chatlog
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Model settings
    #[serde(default)]
    pub model: ModelConfig,
    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// History store settings
    #[serde(default)]
    pub history: HistoryConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name from the registry (ollama, gemini, openai, groq)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier; empty means the provider's default
    #[serde(default)]
    pub model: String,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens per response; unset leaves it to the server
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// System prompt placed at the start of a new conversation
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Stream responses token by token
    #[serde(default)]
    pub stream: bool,
}

fn default_provider() -> String {
    "ollama".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: String::new(),
            temperature: 0.0,
            max_tokens: None,
            system_prompt: None,
            stream: false,
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub ollama: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub groq: ProviderConfig,
}

impl ProvidersConfig {
    /// Look up a provider's settings by registry name
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "ollama" => Some(&self.ollama),
            "gemini" => Some(&self.gemini),
            "openai" => Some(&self.openai),
            "groq" => Some(&self.groq),
            _ => None,
        }
    }
}

/// Single provider settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Which store keeps the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Nothing is persisted
    #[default]
    None,
    /// Process-local map
    Memory,
    /// Redis lists
    Redis,
    /// Supabase table
    Supabase,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "supabase" => Ok(Self::Supabase),
            other => Err(format!("unknown history backend: {}", other)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Supabase => "supabase",
        };
        f.write_str(name)
    }
}

/// History store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Session identifier used when none is given on the command line
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default)]
    pub durability: Durability,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
}

fn default_session_id() -> String {
    "user_session_new".to_string()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            session_id: default_session_id(),
            durability: Durability::default(),
            redis: RedisConfig::default(),
            supabase: SupabaseConfig::default(),
        }
    }
}

/// Redis backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prepended to the session identifier to form the list key
    #[serde(default)]
    pub key_prefix: String,
    /// Keep only the newest N records per session
    #[serde(default)]
    pub max_messages: Option<usize>,
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: String::new(),
            max_messages: None,
        }
    }
}

/// Supabase backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    #[serde(default)]
    pub url: String,
    /// API key
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_supabase_table")]
    pub table: String,
    #[serde(default = "default_supabase_timeout")]
    pub timeout_secs: u64,
}

fn default_supabase_table() -> String {
    "chat_history".to_string()
}

fn default_supabase_timeout() -> u64 {
    30
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key: String::new(),
            table: default_supabase_table(),
            timeout_secs: default_supabase_timeout(),
        }
    }
}
