//! Metadata provider abstraction.
//!
//! A [`MetadataSource`] talks to one external bibliographic API. It is wrapped
//! in a [`Provider`], which applies the cross-cutting behavior every source
//! shares: capability gating, result caching, a per-call timeout and health
//! reporting to the status tracker.

pub mod cache;
mod capabilities;
mod definition;
mod error;
mod managed;
pub mod rate_limiter;

pub use cache::{asin_key, isbn_key, text_key, ExpiringCache, Expiry};
pub use capabilities::{Operation, ProviderCapabilities};
pub use definition::{
    ProviderCategory, ProviderDefinition, ValidationFailure, ValidationResult, DEFAULT_PRIORITY,
    MAX_PRIORITY, MIN_PRIORITY,
};
pub use error::ProviderError;
pub use managed::{CacheSettings, Provider};
pub use rate_limiter::{RateLimitStatus, SlidingWindowLimiter, ThrottleClock};

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::metadata::{Author, Book, BookInfo};

/// Raw contract implemented by each external metadata source.
///
/// Implementations own their rate limiting. `Ok(None)` means the source
/// answered but has no such entity.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Display name of the source.
    fn name(&self) -> &str;

    /// What this source supports.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Suggested priority for new definitions (0 = no opinion).
    fn default_priority(&self) -> u8 {
        0
    }

    /// Fetch an author by foreign id.
    async fn fetch_author(&self, foreign_id: &str) -> Result<Option<Author>, ProviderError>;

    /// Fetch a book (work) by foreign id, with its credited authors.
    async fn fetch_book(&self, foreign_id: &str) -> Result<Option<BookInfo>, ProviderError>;

    /// Search authors by name.
    async fn search_authors(&self, query: &str) -> Result<Vec<Author>, ProviderError>;

    /// Search books by title and optional author.
    async fn search_books(
        &self,
        title: &str,
        author: Option<&str>,
        all_editions: bool,
    ) -> Result<Vec<Book>, ProviderError>;

    /// Search books by ISBN.
    async fn search_isbn(&self, _isbn: &str) -> Result<Vec<Book>, ProviderError> {
        Err(ProviderError::NotSupported {
            provider: self.name().to_string(),
            operation: Operation::SearchIsbn,
        })
    }

    /// Search books by ASIN.
    async fn search_asin(&self, _asin: &str) -> Result<Vec<Book>, ProviderError> {
        Err(ProviderError::NotSupported {
            provider: self.name().to_string(),
            operation: Operation::SearchAsin,
        })
    }

    /// Foreign ids of authors changed since the given instant.
    async fn changed_authors(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<HashSet<String>, ProviderError> {
        Err(ProviderError::NotSupported {
            provider: self.name().to_string(),
            operation: Operation::ChangedAuthors,
        })
    }

    /// Lightweight connectivity check.
    async fn test(&self) -> Result<(), ProviderError>;
}
