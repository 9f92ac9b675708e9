//! Configuration loading and management

use super::schema::Config;
use super::validate::validate_config;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_PREFIX: &str = "CHATLOG__";

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
    env_file: EnvFile,
}

enum EnvFile {
    /// Search the working directory and its parents for `.env`
    Search,
    /// Load this file
    Path(PathBuf),
    /// Read only the process environment
    Skip,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".chatlog"))
            .unwrap_or_else(|| PathBuf::from(".chatlog"));

        Self {
            config_dir,
            env_file: EnvFile::Search,
        }
    }

    /// Create a new config loader with a custom config directory.
    ///
    /// No `.env` file is read unless one is set with [`ConfigLoader::with_env_file`].
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
            env_file: EnvFile::Skip,
        }
    }

    /// Read variables from this `.env` file before applying overrides
    pub fn with_env_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.env_file = EnvFile::Path(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from file and environment
    pub fn load(&self) -> crate::Result<Config> {
        self.load_env_file()?;

        let config_path = self.config_path();
        let mut merged = serde_json::to_value(Config::default())?;

        if config_path.exists() {
            debug!("Reading config from {}", config_path.display());
            let content = std::fs::read_to_string(&config_path)?;
            let file_value: Value = serde_json::from_str(&content)?;
            merge_values(&mut merged, file_value);
        }

        apply_alias_overrides(&mut merged);
        apply_path_overrides(&mut merged);

        let config: Config = serde_json::from_value(merged)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of `config.json`
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    fn load_env_file(&self) -> crate::Result<()> {
        match &self.env_file {
            EnvFile::Search => {
                if let Ok(path) = dotenv::dotenv() {
                    debug!("Loaded environment from {}", path.display());
                }
            }
            EnvFile::Path(path) => {
                dotenv::from_path(path).map_err(|e| {
                    crate::Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                debug!("Loaded environment from {}", path.display());
            }
            EnvFile::Skip => {}
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if let Some(existing) = base_map.get_mut(&key) {
                    merge_values(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return v;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(raw.to_string())
}

fn set_path_value(root: &mut Value, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return;
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.clone(), value);
    }
}

fn apply_alias_overrides(config: &mut Value) {
    let aliases = [
        ("REDIS_URL", "history.redis.url"),
        ("SUPABASE_URL", "history.supabase.url"),
        ("SUPABASE_KEY", "history.supabase.key"),
        ("GOOGLE_API_KEY", "providers.gemini.api_key"),
        ("GEMINI_API_KEY", "providers.gemini.api_key"),
        ("OPENAI_API_KEY", "providers.openai.api_key"),
        ("GROQ_API_KEY", "providers.groq.api_key"),
    ];

    for (env_key, target_path) in aliases {
        if let Ok(value) = std::env::var(env_key) {
            let path: Vec<String> = target_path.split('.').map(ToString::to_string).collect();
            set_path_value(config, &path, Value::String(value));
        }
    }
}

fn apply_path_overrides(config: &mut Value) {
    for (key, value) in std::env::vars() {
        let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let segments: Vec<String> = suffix
            .split("__")
            .filter(|s| !s.is_empty())
            .map(|s| s.to_ascii_lowercase())
            .collect();
        if segments.is_empty() {
            continue;
        }
        let pointer = format!("/{}", segments.join("/"));
        let value = match config.pointer(&pointer) {
            // String fields keep the raw text, so `12345` stays a session id
            Some(Value::String(_)) => Value::String(value),
            _ => parse_env_value(&value),
        };
        set_path_value(config, &segments, value);
    }
}
