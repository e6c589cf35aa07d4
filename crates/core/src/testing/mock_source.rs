//! Mock metadata source for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::metadata::{Author, Book, BookInfo};
use crate::provider::{
    MetadataSource, Operation, ProviderCapabilities, ProviderError, SlidingWindowLimiter,
};

/// A recorded source call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    FetchAuthor {
        foreign_id: String,
    },
    FetchBook {
        foreign_id: String,
    },
    SearchAuthors {
        query: String,
    },
    SearchBooks {
        title: String,
        author: Option<String>,
        all_editions: bool,
    },
    SearchIsbn {
        isbn: String,
    },
    SearchAsin {
        asin: String,
    },
    ChangedAuthors {
        since: DateTime<Utc>,
    },
    Test,
}

impl RecordedCall {
    /// The contract operation this call belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            RecordedCall::FetchAuthor { .. } => Operation::GetAuthor,
            RecordedCall::FetchBook { .. } => Operation::GetBook,
            RecordedCall::SearchAuthors { .. } => Operation::SearchAuthors,
            RecordedCall::SearchBooks { .. } => Operation::SearchBooks,
            RecordedCall::SearchIsbn { .. } => Operation::SearchIsbn,
            RecordedCall::SearchAsin { .. } => Operation::SearchAsin,
            RecordedCall::ChangedAuthors { .. } => Operation::ChangedAuthors,
            RecordedCall::Test => Operation::Test,
        }
    }
}

/// Mock implementation of the MetadataSource trait.
///
/// Provides controllable behavior for testing:
/// - Return configured authors, books and search results
/// - Record every call for assertions
/// - Simulate one-shot or persistent failures and slow responses
///
/// Every call is recorded before any injected failure is applied, so a
/// failing source still shows up as invoked.
///
/// # Example
///
/// ```rust,ignore
/// use bookshelf_core::testing::{fixtures, MockMetadataSource};
///
/// let source = MockMetadataSource::new("primary").with_default_priority(80);
/// source.add_author(fixtures::author("OL1A", "Ursula K. Le Guin")).await;
///
/// let author = source.fetch_author("OL1A").await?;
/// assert!(author.is_some());
/// assert_eq!(source.call_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockMetadataSource {
    name: String,
    capabilities: ProviderCapabilities,
    default_priority: u8,
    /// Authors by foreign id.
    authors: Arc<RwLock<HashMap<String, Author>>>,
    /// Books by foreign id.
    books: Arc<RwLock<HashMap<String, BookInfo>>>,
    author_results: Arc<RwLock<Vec<Author>>>,
    book_results: Arc<RwLock<Vec<Book>>>,
    isbn_results: Arc<RwLock<Vec<Book>>>,
    asin_results: Arc<RwLock<Vec<Book>>>,
    changed_authors: Arc<RwLock<HashSet<String>>>,
    /// Recorded calls.
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ProviderError>>>,
    /// If true, every operation fails.
    failing: Arc<RwLock<bool>>,
    /// Artificial latency per call.
    delay: Arc<RwLock<Option<Duration>>>,
    /// Throttles calls before they are recorded, like a real adapter.
    limiter: Option<SlidingWindowLimiter>,
}

impl MockMetadataSource {
    /// Create a mock supporting every operation, with no suggested priority.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: ProviderCapabilities::all(),
            default_priority: 0,
            authors: Arc::new(RwLock::new(HashMap::new())),
            books: Arc::new(RwLock::new(HashMap::new())),
            author_results: Arc::new(RwLock::new(Vec::new())),
            book_results: Arc::new(RwLock::new(Vec::new())),
            isbn_results: Arc::new(RwLock::new(Vec::new())),
            asin_results: Arc::new(RwLock::new(Vec::new())),
            changed_authors: Arc::new(RwLock::new(HashSet::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing: Arc::new(RwLock::new(false)),
            delay: Arc::new(RwLock::new(None)),
            limiter: None,
        }
    }

    /// Override the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Admit at most `requests_per_minute` calls per sliding minute.
    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.capabilities.max_requests_per_minute = requests_per_minute;
        self.limiter = Some(SlidingWindowLimiter::new(
            self.name.clone(),
            requests_per_minute,
        ));
        self
    }

    /// Set the suggested priority for new definitions.
    pub fn with_default_priority(mut self, priority: u8) -> Self {
        self.default_priority = priority;
        self
    }

    // =========================================================================
    // Data Configuration
    // =========================================================================

    /// Add an author returned by `fetch_author`.
    pub async fn add_author(&self, author: Author) {
        self.authors
            .write()
            .await
            .insert(author.foreign_id.clone(), author);
    }

    /// Add a book returned by `fetch_book`.
    pub async fn add_book(&self, info: BookInfo) {
        self.books
            .write()
            .await
            .insert(info.book.foreign_id.clone(), info);
    }

    /// Results returned by every `search_authors` call.
    pub async fn set_author_results(&self, authors: Vec<Author>) {
        *self.author_results.write().await = authors;
    }

    /// Results returned by every `search_books` call.
    pub async fn set_book_results(&self, books: Vec<Book>) {
        *self.book_results.write().await = books;
    }

    pub async fn set_isbn_results(&self, books: Vec<Book>) {
        *self.isbn_results.write().await = books;
    }

    pub async fn set_asin_results(&self, books: Vec<Book>) {
        *self.asin_results.write().await = books;
    }

    pub async fn set_changed_authors(&self, ids: HashSet<String>) {
        *self.changed_authors.write().await = ids;
    }

    // =========================================================================
    // Call Recording
    // =========================================================================

    /// Get all recorded calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Clear recorded calls.
    pub async fn clear_recorded(&self) {
        self.calls.write().await.clear();
    }

    /// Get the number of calls performed.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Number of calls for one operation.
    pub async fn calls_for(&self, operation: Operation) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    /// Make every operation fail with a server error until switched off.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    /// Delay every call by the given duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Wait on the rate limit, record the call, then apply latency and any
    /// injected failure.
    async fn enter(&self, call: RecordedCall) -> Result<(), ProviderError> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        self.calls.write().await.push(call);

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if *self.failing.read().await {
            return Err(ProviderError::Api {
                status: 503,
                message: format!("{} is unavailable", self.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn default_priority(&self) -> u8 {
        self.default_priority
    }

    async fn fetch_author(&self, foreign_id: &str) -> Result<Option<Author>, ProviderError> {
        self.enter(RecordedCall::FetchAuthor {
            foreign_id: foreign_id.to_string(),
        })
        .await?;

        Ok(self.authors.read().await.get(foreign_id).cloned())
    }

    async fn fetch_book(&self, foreign_id: &str) -> Result<Option<BookInfo>, ProviderError> {
        self.enter(RecordedCall::FetchBook {
            foreign_id: foreign_id.to_string(),
        })
        .await?;

        Ok(self.books.read().await.get(foreign_id).cloned())
    }

    async fn search_authors(&self, query: &str) -> Result<Vec<Author>, ProviderError> {
        self.enter(RecordedCall::SearchAuthors {
            query: query.to_string(),
        })
        .await?;

        Ok(self.author_results.read().await.clone())
    }

    async fn search_books(
        &self,
        title: &str,
        author: Option<&str>,
        all_editions: bool,
    ) -> Result<Vec<Book>, ProviderError> {
        self.enter(RecordedCall::SearchBooks {
            title: title.to_string(),
            author: author.map(str::to_string),
            all_editions,
        })
        .await?;

        Ok(self.book_results.read().await.clone())
    }

    async fn search_isbn(&self, isbn: &str) -> Result<Vec<Book>, ProviderError> {
        self.enter(RecordedCall::SearchIsbn {
            isbn: isbn.to_string(),
        })
        .await?;

        Ok(self.isbn_results.read().await.clone())
    }

    async fn search_asin(&self, asin: &str) -> Result<Vec<Book>, ProviderError> {
        self.enter(RecordedCall::SearchAsin {
            asin: asin.to_string(),
        })
        .await?;

        Ok(self.asin_results.read().await.clone())
    }

    async fn changed_authors(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, ProviderError> {
        self.enter(RecordedCall::ChangedAuthors { since }).await?;

        Ok(self.changed_authors.read().await.clone())
    }

    async fn test(&self) -> Result<(), ProviderError> {
        self.enter(RecordedCall::Test).await
    }
}
