use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::open_library::OpenLibraryConfig;
use crate::provider::{CacheSettings, ProviderDefinition};
use crate::status::BackoffPolicy;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8787
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("bookshelf.db")
}

/// Metadata aggregation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    /// Upper bound for a single provider call, in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub open_library: OpenLibraryConfig,
    /// Definitions inserted on first start, when the store holds none.
    #[serde(default)]
    pub providers: Vec<ProviderDefinition>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            cache: CacheConfig::default(),
            backoff: BackoffConfig::default(),
            open_library: OpenLibraryConfig::default(),
            providers: Vec::new(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

impl MetadataConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Provider cache lifetimes, in days
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Author and book lookups by id. Reads extend the lifetime. (default: 90)
    #[serde(default = "default_entity_ttl")]
    pub entity_ttl_days: u64,
    /// Name and title searches (default: 7)
    #[serde(default = "default_search_ttl")]
    pub search_ttl_days: u64,
    /// ISBN and ASIN searches (default: 90)
    #[serde(default = "default_identifier_ttl")]
    pub identifier_ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entity_ttl_days: default_entity_ttl(),
            search_ttl_days: default_search_ttl(),
            identifier_ttl_days: default_identifier_ttl(),
        }
    }
}

fn default_entity_ttl() -> u64 {
    90
}

fn default_search_ttl() -> u64 {
    7
}

fn default_identifier_ttl() -> u64 {
    90
}

impl From<CacheConfig> for CacheSettings {
    fn from(config: CacheConfig) -> Self {
        Self {
            entity_ttl: Duration::from_secs(config.entity_ttl_days.saturating_mul(SECS_PER_DAY)),
            search_ttl: Duration::from_secs(config.search_ttl_days.saturating_mul(SECS_PER_DAY)),
            identifier_ttl: Duration::from_secs(
                config.identifier_ttl_days.saturating_mul(SECS_PER_DAY),
            ),
        }
    }
}

/// Failure backoff for provider status escalation
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BackoffConfig {
    /// Suspension after the first failure, in seconds (default: 60)
    #[serde(default = "default_backoff_base")]
    pub base_secs: u64,
    /// Longest suspension, in seconds (default: 86400)
    #[serde(default = "default_backoff_max")]
    pub max_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: default_backoff_base(),
            max_secs: default_backoff_max(),
        }
    }
}

fn default_backoff_base() -> u64 {
    60
}

fn default_backoff_max() -> u64 {
    SECS_PER_DAY
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(config: BackoffConfig) -> Self {
        BackoffPolicy::new(
            Duration::from_secs(config.base_secs),
            Duration::from_secs(config.max_secs),
        )
    }
}

/// Setting names containing any of these are redacted in [`SanitizedConfig`].
const SECRET_MARKERS: [&str; 4] = ["key", "token", "secret", "password"];

const REDACTED: &str = "********";

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub metadata: SanitizedMetadataConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedMetadataConfig {
    pub request_timeout_secs: u64,
    pub cache: CacheConfig,
    pub backoff: BackoffConfig,
    pub open_library: OpenLibraryConfig,
    pub providers: Vec<ProviderDefinition>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            metadata: SanitizedMetadataConfig {
                request_timeout_secs: config.metadata.request_timeout_secs,
                cache: config.metadata.cache,
                backoff: config.metadata.backoff,
                open_library: config.metadata.open_library.clone(),
                providers: config
                    .metadata
                    .providers
                    .iter()
                    .map(|definition| ProviderDefinition {
                        settings: redact_settings(&definition.settings),
                        ..definition.clone()
                    })
                    .collect(),
            },
        }
    }
}

/// Replace values of secret-looking keys, at any depth.
pub fn redact_settings(settings: &serde_json::Value) -> serde_json::Value {
    match settings {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let lower = key.to_lowercase();
                    let value = if SECRET_MARKERS.iter().any(|m| lower.contains(m)) {
                        serde_json::Value::String(REDACTED.to_string())
                    } else {
                        redact_settings(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_settings).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "bookshelf.db");
        assert_eq!(config.metadata.request_timeout_secs, 30);
        assert_eq!(config.metadata.cache.search_ttl_days, 7);
        assert_eq!(config.metadata.backoff.max_secs, 86400);
        assert_eq!(config.metadata.open_library.requests_per_minute, 60);
        assert!(config.metadata.providers.is_empty());
    }

    #[test]
    fn test_deserialize_metadata_sections() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[metadata]
request_timeout_secs = 10

[metadata.cache]
search_ttl_days = 1

[metadata.backoff]
base_secs = 30

[metadata.open_library]
base_url = "http://mirror.local"

[[metadata.providers]]
name = "Open Library"
implementation = "OpenLibrary"
priority = 80
enable_author_search = true
enable_book_search = true
tags = ["default"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.metadata.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.metadata.cache.search_ttl_days, 1);
        assert_eq!(config.metadata.cache.entity_ttl_days, 90);
        assert_eq!(config.metadata.backoff.base_secs, 30);
        assert_eq!(config.metadata.open_library.base_url, "http://mirror.local");

        let seed = &config.metadata.providers[0];
        assert_eq!(seed.id, 0);
        assert_eq!(seed.priority, 80);
        assert!(seed.enable_book_search);
        assert!(!seed.enable_automatic_refresh);
        assert_eq!(seed.tags, vec!["default"]);
    }

    #[test]
    fn test_cache_and_backoff_conversions() {
        let cache = CacheSettings::from(CacheConfig::default());
        assert_eq!(cache, CacheSettings::default());

        let policy = BackoffPolicy::from(BackoffConfig {
            base_secs: 10,
            max_secs: 100,
        });
        assert_eq!(policy.base, Duration::from_secs(10));
        assert_eq!(policy.max, Duration::from_secs(100));
    }

    #[test]
    fn test_redact_settings() {
        let settings = json!({
            "base_url": "http://x",
            "api_key": "abc",
            "auth": {"Token": "t", "user": "me"},
            "mirrors": [{"password": "p"}]
        });
        let redacted = redact_settings(&settings);
        assert_eq!(redacted["base_url"], "http://x");
        assert_eq!(redacted["api_key"], REDACTED);
        assert_eq!(redacted["auth"]["Token"], REDACTED);
        assert_eq!(redacted["auth"]["user"], "me");
        assert_eq!(redacted["mirrors"][0]["password"], REDACTED);
    }

    #[test]
    fn test_sanitized_config() {
        let mut config = Config::default();
        config.metadata.providers.push(
            ProviderDefinition::new("Private", "OpenLibrary")
                .with_settings(json!({"secret": "s", "search_limit": 5})),
        );

        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.server.port, 8787);
        let settings = &sanitized.metadata.providers[0].settings;
        assert_eq!(settings["secret"], REDACTED);
        assert_eq!(settings["search_limit"], 5);
    }
}
