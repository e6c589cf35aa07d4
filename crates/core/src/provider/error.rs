//! Error types for metadata providers.

use std::time::Duration;

use thiserror::Error;

use super::Operation;

/// Errors a metadata provider can raise.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider's capability descriptor does not cover this operation.
    #[error("{provider} does not support {operation}")]
    NotSupported {
        provider: String,
        operation: Operation,
    },

    /// Resource not found (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded (429).
    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Provider not configured correctly.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// The call did not complete in time.
    #[error("Provider call timed out after {secs} seconds")]
    Timeout { secs: u64 },
}

impl ProviderError {
    /// Whether this error means "the source answered, but has nothing".
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    /// Whether this is a capability gap rather than a runtime failure.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, ProviderError::NotSupported { .. })
    }

    /// Lower bound for the provider's suspension window, if the source told us one.
    pub fn minimum_backoff(&self) -> Duration {
        match self {
            ProviderError::RateLimited {
                retry_after_secs: Some(secs),
            } => Duration::from_secs(*secs),
            _ => Duration::ZERO,
        }
    }
}
