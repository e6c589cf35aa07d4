//! Open Library metadata source.
//!
//! Open Library asks API consumers to identify themselves with a descriptive
//! User-Agent and to keep request rates modest. Every request made by
//! [`OpenLibrarySource`] waits on a per-instance sliding-window limiter.

mod client;
mod types;

pub use client::OpenLibrarySource;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::{MetadataSource, ProviderDefinition, ProviderError};
use crate::registry::ProviderFactory;

/// Implementation key for provider definitions backed by Open Library.
pub const IMPLEMENTATION: &str = "OpenLibrary";

/// Open Library client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLibraryConfig {
    /// API base URL (default: https://openlibrary.org).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Covers base URL (default: https://covers.openlibrary.org).
    #[serde(default = "default_covers_url")]
    pub covers_url: String,
    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Max requests per minute (0 = unlimited).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Max results requested from the search endpoints.
    #[serde(default = "default_search_limit")]
    pub search_limit: u32,
    /// HTTP timeout per request. Unset falls back to `metadata.request_timeout_secs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "https://openlibrary.org".to_string()
}

fn default_covers_url() -> String {
    "https://covers.openlibrary.org".to_string()
}

fn default_user_agent() -> String {
    format!(
        "Bookshelf/{} ( https://github.com/bookshelf )",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_search_limit() -> u32 {
    20
}

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

impl Default for OpenLibraryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            covers_url: default_covers_url(),
            user_agent: default_user_agent(),
            requests_per_minute: default_requests_per_minute(),
            search_limit: default_search_limit(),
            timeout_secs: None,
        }
    }
}

/// Per-definition overrides read from a definition's `settings`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsOverride {
    base_url: Option<String>,
    covers_url: Option<String>,
    requests_per_minute: Option<u32>,
    search_limit: Option<u32>,
    timeout_secs: Option<u64>,
}

impl OpenLibraryConfig {
    /// HTTP timeout applied to each request.
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(FALLBACK_TIMEOUT)
    }

    /// Use `timeout` unless a timeout is already configured.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        if self.timeout_secs.is_none() {
            self.timeout_secs = Some(timeout.as_secs());
        }
        self
    }

    /// This config with a definition's settings applied on top.
    pub fn with_settings(&self, settings: &serde_json::Value) -> Result<Self, ProviderError> {
        if settings.is_null() {
            return Ok(self.clone());
        }

        let overrides: SettingsOverride = serde_json::from_value(settings.clone())
            .map_err(|e| ProviderError::NotConfigured(format!("invalid settings: {}", e)))?;

        let mut config = self.clone();
        if let Some(base_url) = overrides.base_url {
            config.base_url = base_url;
        }
        if let Some(covers_url) = overrides.covers_url {
            config.covers_url = covers_url;
        }
        if let Some(rpm) = overrides.requests_per_minute {
            config.requests_per_minute = rpm;
        }
        if let Some(limit) = overrides.search_limit {
            config.search_limit = limit;
        }
        match overrides.timeout_secs {
            Some(0) => {
                return Err(ProviderError::NotConfigured(
                    "invalid settings: timeout_secs cannot be 0".to_string(),
                ))
            }
            Some(timeout) => config.timeout_secs = Some(timeout),
            None => {}
        }
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        config.covers_url = config.covers_url.trim_end_matches('/').to_string();
        Ok(config)
    }
}

/// Register the Open Library implementation with a factory.
pub fn register(factory: &mut ProviderFactory, config: OpenLibraryConfig) {
    factory.register(IMPLEMENTATION, move |definition: &ProviderDefinition| {
        let source = OpenLibrarySource::from_definition(&config, definition)?;
        Ok(Arc::new(source) as Arc<dyn MetadataSource>)
    });
}
