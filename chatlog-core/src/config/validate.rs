//! Configuration validation rules.

use super::schema::{BackendKind, Config};

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.model.provider.trim().is_empty() {
        errors.push("model.provider must not be empty".to_string());
    }
    if !(0.0..=2.0).contains(&config.model.temperature) {
        errors.push("model.temperature must be in [0.0, 2.0]".to_string());
    }
    if config.model.max_tokens == Some(0) {
        errors.push("model.max_tokens must be > 0 when set".to_string());
    }

    let history = &config.history;
    if history.session_id.trim().is_empty() {
        errors.push("history.session_id must not be empty".to_string());
    }

    match history.backend {
        BackendKind::None | BackendKind::Memory => {}
        BackendKind::Redis => {
            let url = history.redis.url.trim();
            if !(url.starts_with("redis://")
                || url.starts_with("rediss://")
                || url.starts_with("unix://"))
            {
                errors.push(
                    "history.redis.url must start with redis://, rediss:// or unix://".to_string(),
                );
            }
            if history.redis.max_messages == Some(0) {
                errors.push("history.redis.max_messages must be > 0 when set".to_string());
            }
        }
        BackendKind::Supabase => {
            if history.supabase.url.trim().is_empty() {
                errors.push(
                    "history.supabase.url is required when the supabase backend is selected"
                        .to_string(),
                );
            }
            if history.supabase.key.trim().is_empty() {
                errors.push(
                    "history.supabase.key is required when the supabase backend is selected"
                        .to_string(),
                );
            }
            if history.supabase.table.trim().is_empty() {
                errors.push("history.supabase.table must not be empty".to_string());
            }
        }
    }

    if !matches!(config.logging.format.to_lowercase().as_str(), "text" | "json") {
        errors.push("logging.format must be text or json".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        validate_config(&Config::default()).unwrap();
    }

    #[test]
    fn test_validate_supabase_requires_credentials() {
        let mut config = Config::default();
        config.history.backend = BackendKind::Supabase;

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("history.supabase.url"));
        assert!(err.contains("history.supabase.key"));
    }

    #[test]
    fn test_validate_redis_url_scheme() {
        let mut config = Config::default();
        config.history.backend = BackendKind::Redis;
        validate_config(&config).unwrap();

        config.history.redis.url = "http://localhost:6379".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("history.redis.url"));
    }

    #[test]
    fn test_validate_empty_session_id() {
        let mut config = Config::default();
        config.history.session_id = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("history.session_id"));
    }
}
