use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::provider::MAX_PRIORITY;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let metadata = &config.metadata;
    if metadata.request_timeout_secs == 0 {
        return Err(invalid("metadata.request_timeout_secs cannot be 0"));
    }

    let cache = &metadata.cache;
    for (name, days) in [
        ("entity_ttl_days", cache.entity_ttl_days),
        ("search_ttl_days", cache.search_ttl_days),
        ("identifier_ttl_days", cache.identifier_ttl_days),
    ] {
        if days == 0 {
            return Err(invalid(format!("metadata.cache.{} cannot be 0", name)));
        }
    }

    let backoff = &metadata.backoff;
    if backoff.base_secs == 0 {
        return Err(invalid("metadata.backoff.base_secs cannot be 0"));
    }
    if backoff.base_secs > backoff.max_secs {
        return Err(invalid(format!(
            "metadata.backoff.base_secs ({}) exceeds max_secs ({})",
            backoff.base_secs, backoff.max_secs
        )));
    }

    if metadata.open_library.search_limit == 0 {
        return Err(invalid("metadata.open_library.search_limit cannot be 0"));
    }
    if metadata.open_library.timeout_secs == Some(0) {
        return Err(invalid("metadata.open_library.timeout_secs cannot be 0"));
    }

    // Seeds: priority 0 means "not set" and is resolved when the seed is created.
    let mut names = HashSet::new();
    for seed in &metadata.providers {
        if seed.name.trim().is_empty() {
            return Err(invalid("metadata.providers: name cannot be empty"));
        }
        if seed.priority > MAX_PRIORITY {
            return Err(invalid(format!(
                "metadata.providers '{}': priority {} is outside 1..={}",
                seed.name, seed.priority, MAX_PRIORITY
            )));
        }
        if !names.insert(seed.name.to_lowercase()) {
            return Err(invalid(format!(
                "metadata.providers: duplicate name '{}'",
                seed.name
            )));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, ServerConfig};
    use crate::provider::ProviderDefinition;
    use std::net::IpAddr;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server = ServerConfig {
            host: "0.0.0.0".parse::<IpAddr>().unwrap(),
            port: 0,
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_timeout_and_ttl_fail() {
        let mut config = Config::default();
        config.metadata.request_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.metadata.open_library.timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.metadata.cache.search_ttl_days = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("search_ttl_days"));
    }

    #[test]
    fn test_validate_backoff_base_above_max_fails() {
        let mut config = Config::default();
        config.metadata.backoff = BackoffConfig {
            base_secs: 600,
            max_secs: 60,
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_seed_priority() {
        let mut config = Config::default();
        config
            .metadata
            .providers
            .push(ProviderDefinition::new("a", "OpenLibrary").with_priority(0));
        assert!(validate_config(&config).is_ok());

        config
            .metadata
            .providers
            .push(ProviderDefinition::new("b", "OpenLibrary").with_priority(101));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_seed_names() {
        let mut config = Config::default();
        config.metadata.providers = vec![
            ProviderDefinition::new("Open Library", "OpenLibrary"),
            ProviderDefinition::new("open library", "OpenLibrary"),
        ];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
