//! Managed provider: a metadata source plus the behavior every source shares.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::cache::{asin_key, isbn_key, text_key, ExpiringCache, Expiry};
use super::{
    MetadataSource, Operation, ProviderCapabilities, ProviderDefinition, ProviderError,
    ThrottleClock, ValidationResult,
};
use crate::metadata::{Author, Book, BookInfo};
use crate::metrics::{PROVIDER_REQUESTS, PROVIDER_REQUEST_DURATION};
use crate::status::StatusTracker;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Expiry windows for a provider's caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Author and book by id (rolling).
    pub entity_ttl: Duration,
    /// Title and name searches (fixed).
    pub search_ttl: Duration,
    /// ISBN and ASIN searches (fixed).
    pub identifier_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            entity_ttl: DAY * 90,
            search_ttl: DAY * 7,
            identifier_ttl: DAY * 90,
        }
    }
}

struct ProviderCaches {
    authors: ExpiringCache<Author>,
    books: ExpiringCache<BookInfo>,
    author_searches: ExpiringCache<Vec<Author>>,
    book_searches: ExpiringCache<Vec<Book>>,
    isbn: ExpiringCache<Vec<Book>>,
    asin: ExpiringCache<Vec<Book>>,
}

impl ProviderCaches {
    fn new(settings: CacheSettings) -> Self {
        Self {
            authors: ExpiringCache::new("author", Expiry::Rolling(settings.entity_ttl)),
            books: ExpiringCache::new("book", Expiry::Rolling(settings.entity_ttl)),
            author_searches: ExpiringCache::new(
                "author_search",
                Expiry::Fixed(settings.search_ttl),
            ),
            book_searches: ExpiringCache::new("book_search", Expiry::Fixed(settings.search_ttl)),
            isbn: ExpiringCache::new("isbn", Expiry::Fixed(settings.identifier_ttl)),
            asin: ExpiringCache::new("asin", Expiry::Fixed(settings.identifier_ttl)),
        }
    }
}

/// A configured provider instance.
///
/// Every operation is gated on the source's capabilities (a gap fails with
/// [`ProviderError::NotSupported`] without calling the source), bounded by the
/// call timeout, and reported to the status tracker. Time the source spends
/// waiting on its own rate limiter does not count toward the timeout. A not-found answer is
/// returned as `None` or an empty list and counts as a healthy response.
/// Errors are logged and returned, never swallowed.
pub struct Provider {
    definition: ProviderDefinition,
    source: Arc<dyn MetadataSource>,
    capabilities: ProviderCapabilities,
    status: Arc<StatusTracker>,
    caches: ProviderCaches,
    call_timeout: Duration,
}

impl Provider {
    pub fn new(
        definition: ProviderDefinition,
        source: Arc<dyn MetadataSource>,
        status: Arc<StatusTracker>,
        cache_settings: CacheSettings,
        call_timeout: Duration,
    ) -> Self {
        let capabilities = source.capabilities();
        Self {
            definition,
            source,
            capabilities,
            status,
            caches: ProviderCaches::new(cache_settings),
            call_timeout,
        }
    }

    pub fn id(&self) -> i64 {
        self.definition.id
    }

    /// Display name from the definition.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ProviderDefinition {
        &self.definition
    }

    pub fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.capabilities.supports(operation)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Get an author by foreign id. `use_cache = false` skips both cache read and write.
    pub async fn get_author(
        &self,
        foreign_id: &str,
        use_cache: bool,
    ) -> Result<Option<Author>, ProviderError> {
        self.gate(Operation::GetAuthor)?;

        if use_cache {
            if let Some(author) = self.caches.authors.get(foreign_id) {
                return Ok(Some(author));
            }
        }

        let author = self
            .observe(Operation::GetAuthor, self.source.fetch_author(foreign_id))
            .await?
            .flatten();

        if use_cache {
            if let Some(author) = &author {
                self.caches.authors.insert(foreign_id, author.clone());
            }
        }
        Ok(author)
    }

    /// Get a book by foreign id, with its credited authors.
    pub async fn get_book(&self, foreign_id: &str) -> Result<Option<BookInfo>, ProviderError> {
        self.gate(Operation::GetBook)?;

        if let Some(info) = self.caches.books.get(foreign_id) {
            return Ok(Some(info));
        }

        let info = self
            .observe(Operation::GetBook, self.source.fetch_book(foreign_id))
            .await?
            .flatten();

        if let Some(info) = &info {
            self.caches.books.insert(foreign_id, info.clone());
        }
        Ok(info)
    }

    pub async fn search_authors(&self, query: &str) -> Result<Vec<Author>, ProviderError> {
        self.gate(Operation::SearchAuthors)?;

        let key = text_key(query);
        if let Some(authors) = self.caches.author_searches.get(&key) {
            return Ok(authors);
        }

        let authors = self
            .observe(Operation::SearchAuthors, self.source.search_authors(query))
            .await?
            .unwrap_or_default();

        if !authors.is_empty() {
            self.caches.author_searches.insert(key, authors.clone());
        }
        Ok(authors)
    }

    pub async fn search_books(
        &self,
        title: &str,
        author: Option<&str>,
        all_editions: bool,
    ) -> Result<Vec<Book>, ProviderError> {
        self.gate(Operation::SearchBooks)?;

        let key = format!(
            "{}|{}|{}",
            text_key(title),
            author.map(text_key).unwrap_or_default(),
            all_editions
        );
        if let Some(books) = self.caches.book_searches.get(&key) {
            return Ok(books);
        }

        let books = self
            .observe(
                Operation::SearchBooks,
                self.source.search_books(title, author, all_editions),
            )
            .await?
            .unwrap_or_default();

        if !books.is_empty() {
            self.caches.book_searches.insert(key, books.clone());
        }
        Ok(books)
    }

    pub async fn search_by_isbn(&self, isbn: &str) -> Result<Vec<Book>, ProviderError> {
        self.gate(Operation::SearchIsbn)?;

        let key = isbn_key(isbn);
        if let Some(books) = self.caches.isbn.get(&key) {
            return Ok(books);
        }

        let books = self
            .observe(Operation::SearchIsbn, self.source.search_isbn(&key))
            .await?
            .unwrap_or_default();

        if !books.is_empty() {
            self.caches.isbn.insert(key, books.clone());
        }
        Ok(books)
    }

    pub async fn search_by_asin(&self, asin: &str) -> Result<Vec<Book>, ProviderError> {
        self.gate(Operation::SearchAsin)?;

        let key = asin_key(asin);
        if let Some(books) = self.caches.asin.get(&key) {
            return Ok(books);
        }

        let books = self
            .observe(Operation::SearchAsin, self.source.search_asin(&key))
            .await?
            .unwrap_or_default();

        if !books.is_empty() {
            self.caches.asin.insert(key, books.clone());
        }
        Ok(books)
    }

    /// Foreign ids of authors changed since `since`. Never cached.
    pub async fn get_changed_authors(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, ProviderError> {
        self.gate(Operation::ChangedAuthors)?;

        Ok(self
            .observe(Operation::ChangedAuthors, self.source.changed_authors(since))
            .await?
            .unwrap_or_default())
    }

    /// Run the source's connectivity check, bounded by the call timeout.
    ///
    /// Does not touch the status tracker; callers decide whether the outcome
    /// should be recorded.
    pub async fn check_connectivity(&self) -> Result<(), ProviderError> {
        self.bounded(self.source.test()).await
    }

    /// Connectivity check with failures captured as validation errors.
    pub async fn test(&self) -> ValidationResult {
        match self.check_connectivity().await {
            Ok(()) => ValidationResult::ok(),
            Err(e) => ValidationResult::failure("", e.to_string()),
        }
    }

    /// Drop expired entries from every cache.
    pub fn purge_expired_caches(&self) -> usize {
        self.caches.authors.purge_expired()
            + self.caches.books.purge_expired()
            + self.caches.author_searches.purge_expired()
            + self.caches.book_searches.purge_expired()
            + self.caches.isbn.purge_expired()
            + self.caches.asin.purge_expired()
    }

    // =========================================================================
    // Cross-cutting
    // =========================================================================

    fn gate(&self, operation: Operation) -> Result<(), ProviderError> {
        if self.capabilities.supports(operation) {
            Ok(())
        } else {
            debug!("{} does not support {}", self.name(), operation);
            Err(ProviderError::NotSupported {
                provider: self.name().to_string(),
                operation,
            })
        }
    }

    /// Run one source call: timeout, metrics, status reporting.
    ///
    /// `Ok(None)` means the source reported not-found.
    async fn observe<T>(
        &self,
        operation: Operation,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<Option<T>, ProviderError> {
        let start = Instant::now();
        let result = self.bounded(call).await;

        PROVIDER_REQUEST_DURATION
            .with_label_values(&[self.name(), operation.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(value) => {
                self.record_success();
                Ok(Some(value))
            }
            Err(e) if e.is_not_found() => {
                debug!("{} {}: not found", self.name(), operation);
                self.record_success();
                Ok(None)
            }
            Err(e) if e.is_not_supported() => Err(e),
            Err(e) => {
                warn!("{} {} failed: {}", self.name(), operation, e);
                self.record_failure(e.minimum_backoff());
                Err(e)
            }
        };

        let label = match &outcome {
            Ok(Some(_)) => "success",
            Ok(None) => "not_found",
            Err(ProviderError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        PROVIDER_REQUESTS
            .with_label_values(&[self.name(), operation.as_str(), label])
            .inc();

        outcome
    }

    /// Run a source call under the call timeout, pausing the timeout while the
    /// call is held back by a rate limiter.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        let clock = Arc::new(ThrottleClock::default());
        let started = tokio::time::Instant::now();
        let call = Arc::clone(&clock).scope(call);
        tokio::pin!(call);

        let mut deadline = started + self.call_timeout;
        loop {
            tokio::select! {
                result = &mut call => return result,
                _ = tokio::time::sleep_until(deadline) => {
                    let active = started.elapsed().saturating_sub(clock.throttled());
                    if active >= self.call_timeout {
                        return Err(ProviderError::Timeout {
                            secs: self.call_timeout.as_secs(),
                        });
                    }
                    deadline = tokio::time::Instant::now() + (self.call_timeout - active);
                }
            }
        }
    }

    fn record_success(&self) {
        if self.definition.is_persisted() {
            self.status.record_success(self.id());
        }
    }

    fn record_failure(&self, minimum_backoff: Duration) {
        if self.definition.is_persisted() {
            self.status.record_failure(self.id(), minimum_backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::BackoffPolicy;
    use crate::store::SqliteMetadataStore;
    use crate::testing::{fixtures, MockMetadataSource, RecordedCall};

    fn provider_with(source: Arc<MockMetadataSource>) -> (Provider, Arc<StatusTracker>) {
        provider_with_timeout(source, Duration::from_secs(5))
    }

    fn provider_with_timeout(
        source: Arc<MockMetadataSource>,
        call_timeout: Duration,
    ) -> (Provider, Arc<StatusTracker>) {
        let store = Arc::new(SqliteMetadataStore::in_memory().unwrap());
        let status = Arc::new(StatusTracker::new(store, BackoffPolicy::default()));
        let mut definition = ProviderDefinition::new("Mock", "Mock");
        definition.id = 1;
        let provider = Provider::new(
            definition,
            source,
            Arc::clone(&status),
            CacheSettings::default(),
            call_timeout,
        );
        (provider, status)
    }

    #[tokio::test]
    async fn test_author_cache_roundtrip() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source.add_author(fixtures::author("OL1A", "Ursula K. Le Guin")).await;
        let (provider, _) = provider_with(Arc::clone(&source));

        provider.get_author("OL1A", true).await.unwrap();
        provider.get_author("OL1A", true).await.unwrap();
        assert_eq!(source.call_count().await, 1);

        provider.get_author("OL1A", false).await.unwrap();
        provider.get_author("OL1A", false).await.unwrap();
        assert_eq!(source.call_count().await, 3);
    }

    #[tokio::test]
    async fn test_bypass_does_not_populate_cache() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source.add_author(fixtures::author("OL1A", "Ursula K. Le Guin")).await;
        let (provider, _) = provider_with(Arc::clone(&source));

        provider.get_author("OL1A", false).await.unwrap();
        provider.get_author("OL1A", true).await.unwrap();
        assert_eq!(source.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_capability_gap_never_calls_source() {
        let source = Arc::new(MockMetadataSource::new("mock").with_capabilities(
            ProviderCapabilities {
                author_search: true,
                ..Default::default()
            },
        ));
        let (provider, status) = provider_with(Arc::clone(&source));

        let err = provider.search_by_isbn("9780441172719").await.unwrap_err();
        assert!(err.is_not_supported());
        let err = provider.get_book("OL1W").await.unwrap_err();
        assert!(err.is_not_supported());

        assert_eq!(source.call_count().await, 0);
        assert_eq!(status.failed_query_count(1), 0);
        assert_eq!(status.successful_query_count(1), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_none_and_healthy() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source
            .set_next_error(ProviderError::NotFound("OL9A".to_string()))
            .await;
        let (provider, status) = provider_with(Arc::clone(&source));

        assert!(provider.get_author("OL9A", true).await.unwrap().is_none());
        assert_eq!(status.successful_query_count(1), 1);
        assert_eq!(status.failed_query_count(1), 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_returned() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source
            .set_next_error(ProviderError::RateLimited {
                retry_after_secs: Some(7200),
            })
            .await;
        let (provider, status) = provider_with(Arc::clone(&source));

        let err = provider.search_authors("le guin").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));

        let recorded = status.status(1);
        assert_eq!(recorded.escalation_level, 1);
        let till = recorded.disabled_till.unwrap();
        assert!(till > Utc::now() + chrono::Duration::seconds(7000));
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        let (provider, status) = provider_with(Arc::clone(&source));

        provider.search_authors("nobody").await.unwrap();
        assert_eq!(status.successful_query_count(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_call_times_out() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source.set_delay(Duration::from_secs(60)).await;
        let (provider, status) = provider_with(Arc::clone(&source));

        let err = provider.get_book("OL1W").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { secs: 5 }));
        assert_eq!(status.failed_query_count(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_wait_is_not_a_timeout() {
        let source = Arc::new(MockMetadataSource::new("mock").with_rate_limit(1));
        let (provider, status) =
            provider_with_timeout(Arc::clone(&source), Duration::from_secs(30));

        provider.search_authors("le guin").await.unwrap();
        let started = tokio::time::Instant::now();
        provider.search_authors("butler").await.unwrap();

        // The second call waited out the window, well past the timeout.
        assert!(started.elapsed() >= Duration::from_secs(59));
        assert_eq!(source.call_count().await, 2);
        assert_eq!(status.successful_query_count(1), 2);
        assert_eq!(status.failed_query_count(1), 0);
        assert!(status.blocked_providers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_after_rate_limit_wait_still_times_out() {
        let source = Arc::new(MockMetadataSource::new("mock").with_rate_limit(1));
        let (provider, status) =
            provider_with_timeout(Arc::clone(&source), Duration::from_secs(30));

        provider.search_authors("le guin").await.unwrap();
        source.set_delay(Duration::from_secs(300)).await;

        let started = tokio::time::Instant::now();
        let err = provider.search_authors("butler").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { secs: 30 }));

        // About 60s throttled plus 30s stalled.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(89));
        assert!(elapsed <= Duration::from_secs(91));
        assert_eq!(status.failed_query_count(1), 1);
    }

    #[tokio::test]
    async fn test_search_keys_are_normalized() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source
            .set_isbn_results(vec![fixtures::book("OL1W", "Dune", "OL1A")])
            .await;
        source
            .set_book_results(vec![fixtures::book("OL1W", "Dune", "OL1A")])
            .await;
        let (provider, _) = provider_with(Arc::clone(&source));

        provider.search_by_isbn("978-0-441-17271-9").await.unwrap();
        provider.search_by_isbn("9780441172719").await.unwrap();
        provider.search_books("Dune", None, false).await.unwrap();
        provider.search_books("  dune ", None, false).await.unwrap();

        let calls = source.recorded_calls().await;
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], RecordedCall::SearchIsbn { isbn } if isbn == "9780441172719"));
    }

    #[tokio::test]
    async fn test_empty_search_results_are_not_cached() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        let (provider, _) = provider_with(Arc::clone(&source));

        provider.search_by_asin("B000FC0PDU").await.unwrap();
        provider.search_by_asin("b000fc0pdu").await.unwrap();
        assert_eq!(source.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_connectivity_check_is_not_recorded() {
        let source = Arc::new(MockMetadataSource::new("mock"));
        source.set_failing(true).await;
        let (provider, status) = provider_with(Arc::clone(&source));

        let result = provider.test().await;
        assert!(!result.is_valid());
        assert_eq!(status.failed_query_count(1), 0);
    }

    #[tokio::test]
    async fn test_unsaved_definition_skips_status() {
        let store = Arc::new(SqliteMetadataStore::in_memory().unwrap());
        let status = Arc::new(StatusTracker::new(store, BackoffPolicy::default()));
        let source = Arc::new(MockMetadataSource::new("mock"));
        source.set_failing(true).await;
        let provider = Provider::new(
            ProviderDefinition::new("Draft", "Mock"),
            source,
            Arc::clone(&status),
            CacheSettings::default(),
            Duration::from_secs(5),
        );

        assert!(provider.search_authors("x").await.is_err());
        assert!(status.all().is_empty());
    }
}
