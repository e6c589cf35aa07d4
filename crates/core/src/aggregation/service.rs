//! The aggregation service: the single entry point for metadata lookups.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::dedup::deduplicate;
use super::relevance::{filter_and_rank_authors, rank_by, score_entity};
use super::term::{parse_search_term, SearchTerm};
use super::AggregationError;
use crate::metadata::{Author, Book, BookInfo, ForeignKeyed, SearchEntity};
use crate::metrics::{AGGREGATE_RESULTS, FAILOVER_ATTEMPTS};
use crate::provider::{Operation, Provider, ProviderCategory, ProviderError};
use crate::registry::ProviderRegistry;

/// Queries providers in priority order with failover or merging.
///
/// Fetch-one operations stop at the first provider with a usable answer.
/// Search operations call every eligible provider, skip the ones that fail
/// and deduplicate the merged results. Providers are always called one at a
/// time, highest priority first.
pub struct AggregationService {
    registry: Arc<ProviderRegistry>,
}

impl AggregationService {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    // =========================================================================
    // Fetch one
    // =========================================================================

    /// Resolve an author by foreign id.
    pub async fn get_author_info(
        &self,
        foreign_id: &str,
        use_cache: bool,
    ) -> Result<Author, AggregationError> {
        let providers = self.providers(ProviderCategory::AuthorSearch)?;
        fetch_one(
            providers,
            ProviderCategory::AuthorSearch,
            Operation::GetAuthor,
            foreign_id,
            move |provider| async move { provider.get_author(foreign_id, use_cache).await },
        )
        .await
    }

    /// Resolve a book by foreign id.
    pub async fn get_book_info(&self, foreign_id: &str) -> Result<BookInfo, AggregationError> {
        let providers = self.providers(ProviderCategory::BookSearch)?;
        fetch_one(
            providers,
            ProviderCategory::BookSearch,
            Operation::GetBook,
            foreign_id,
            move |provider| async move { provider.get_book(foreign_id).await },
        )
        .await
    }

    // =========================================================================
    // Search and merge
    // =========================================================================

    /// Foreign ids of authors changed since `since`, across every refresh provider.
    ///
    /// Returns an empty set when no provider offers a change feed.
    pub async fn get_changed_authors(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, AggregationError> {
        let providers =
            self.capable(ProviderCategory::AutomaticRefresh, Operation::ChangedAuthors)?;
        if providers.is_empty() {
            debug!("No provider offers a change feed");
            return Ok(HashSet::new());
        }

        let mut changed = HashSet::new();
        for provider in providers {
            match provider.get_changed_authors(since).await {
                Ok(ids) => changed.extend(ids),
                Err(e) => skip(&provider, Operation::ChangedAuthors, &e),
            }
        }

        info!("{} authors changed since {}", changed.len(), since);
        AGGREGATE_RESULTS
            .with_label_values(&[Operation::ChangedAuthors.as_str()])
            .observe(changed.len() as f64);
        Ok(changed)
    }

    /// Search authors by name, gated and ranked by relevance.
    pub async fn search_for_new_author(&self, query: &str) -> Result<Vec<Author>, AggregationError> {
        let providers = self.required(ProviderCategory::AuthorSearch)?;
        let merged = merge(providers, Operation::SearchAuthors, move |provider| async move {
            provider.search_authors(query).await
        })
        .await;

        let ranked = filter_and_rank_authors(query, merged);
        observe_results(Operation::SearchAuthors, ranked.len());
        Ok(ranked)
    }

    /// Search books by title and optional author. Results are merged, not ranked.
    pub async fn search_for_new_book(
        &self,
        title: &str,
        author: Option<&str>,
        all_editions: bool,
    ) -> Result<Vec<Book>, AggregationError> {
        let providers = self.required(ProviderCategory::BookSearch)?;
        let books = merge(providers, Operation::SearchBooks, move |provider| async move {
            provider.search_books(title, author, all_editions).await
        })
        .await;

        observe_results(Operation::SearchBooks, books.len());
        Ok(books)
    }

    /// Search books by ISBN. Empty when no provider supports ISBN lookup.
    pub async fn search_by_isbn(&self, isbn: &str) -> Result<Vec<Book>, AggregationError> {
        let providers = self.capable(ProviderCategory::BookSearch, Operation::SearchIsbn)?;
        if providers.is_empty() {
            debug!("No provider supports ISBN lookup");
            return Ok(Vec::new());
        }

        let books = merge(providers, Operation::SearchIsbn, move |provider| async move {
            provider.search_by_isbn(isbn).await
        })
        .await;

        observe_results(Operation::SearchIsbn, books.len());
        Ok(books)
    }

    /// Search books by ASIN. Empty when no provider supports ASIN lookup.
    pub async fn search_by_asin(&self, asin: &str) -> Result<Vec<Book>, AggregationError> {
        let providers = self.capable(ProviderCategory::BookSearch, Operation::SearchAsin)?;
        if providers.is_empty() {
            debug!("No provider supports ASIN lookup");
            return Ok(Vec::new());
        }

        let books = merge(providers, Operation::SearchAsin, move |provider| async move {
            provider.search_by_asin(asin).await
        })
        .await;

        observe_results(Operation::SearchAsin, books.len());
        Ok(books)
    }

    /// Interactive search over authors and books.
    ///
    /// Prefixed terms (`isbn:`, `asin:`, `author:`, `work:`, `book:`) and bare
    /// ISBNs are routed to the matching lookup. Free text searches authors and
    /// books on every interactive provider and ranks the merged results.
    pub async fn search_for_new_entity(
        &self,
        term: &str,
    ) -> Result<Vec<SearchEntity>, AggregationError> {
        match parse_search_term(term) {
            SearchTerm::Isbn(isbn) => Ok(books_to_entities(self.search_by_isbn(&isbn).await?)),
            SearchTerm::Asin(asin) => Ok(books_to_entities(self.search_by_asin(&asin).await?)),
            SearchTerm::AuthorId(id) => match self.get_author_info(&id, true).await {
                Ok(author) => Ok(vec![SearchEntity::Author(author)]),
                Err(AggregationError::MetadataNotFound { .. }) => Ok(Vec::new()),
                Err(e) => Err(e),
            },
            SearchTerm::BookId(id) => match self.get_book_info(&id).await {
                Ok(info) => Ok(vec![SearchEntity::Book(info.book)]),
                Err(AggregationError::MetadataNotFound { .. }) => Ok(Vec::new()),
                Err(e) => Err(e),
            },
            SearchTerm::Text(text) => self.search_text(&text).await,
        }
    }

    async fn search_text(&self, text: &str) -> Result<Vec<SearchEntity>, AggregationError> {
        let providers = self.required(ProviderCategory::InteractiveSearch)?;

        let mut entities = Vec::new();
        for provider in providers {
            let definition = provider.definition();

            if definition.enable_author_search && provider.supports(Operation::SearchAuthors) {
                match provider.search_authors(text).await {
                    Ok(authors) => entities.extend(authors.into_iter().map(SearchEntity::Author)),
                    Err(e) => skip(&provider, Operation::SearchAuthors, &e),
                }
            }

            if definition.enable_book_search && provider.supports(Operation::SearchBooks) {
                match provider.search_books(text, None, false).await {
                    Ok(books) => entities.extend(books.into_iter().map(SearchEntity::Book)),
                    Err(e) => skip(&provider, Operation::SearchBooks, &e),
                }
            }
        }

        let ranked = rank_by(deduplicate(entities), |entity| score_entity(text, entity));
        info!("Entity search '{}' returned {} results", text, ranked.len());
        AGGREGATE_RESULTS
            .with_label_values(&["search_entity"])
            .observe(ranked.len() as f64);
        Ok(ranked)
    }

    // =========================================================================
    // Provider selection
    // =========================================================================

    fn providers(&self, category: ProviderCategory) -> Result<Vec<Arc<Provider>>, AggregationError> {
        Ok(self.registry.by_category(category, true)?)
    }

    /// Providers for a category, failing when there are none.
    fn required(&self, category: ProviderCategory) -> Result<Vec<Arc<Provider>>, AggregationError> {
        let providers = self.providers(category)?;
        if providers.is_empty() {
            warn!("No metadata providers available for {}", category);
            return Err(AggregationError::NoProvidersAvailable { category });
        }
        Ok(providers)
    }

    /// Providers for a category whose capabilities cover the operation.
    fn capable(
        &self,
        category: ProviderCategory,
        operation: Operation,
    ) -> Result<Vec<Arc<Provider>>, AggregationError> {
        Ok(self
            .providers(category)?
            .into_iter()
            .filter(|provider| provider.supports(operation))
            .collect())
    }
}

/// Try providers in order until one returns a well-formed result.
async fn fetch_one<T, F, Fut>(
    providers: Vec<Arc<Provider>>,
    category: ProviderCategory,
    operation: Operation,
    foreign_id: &str,
    call: F,
) -> Result<T, AggregationError>
where
    T: ForeignKeyed,
    F: Fn(Arc<Provider>) -> Fut,
    Fut: Future<Output = Result<Option<T>, ProviderError>>,
{
    if providers.is_empty() {
        warn!("No metadata providers available for {}", category);
        return Err(AggregationError::NoProvidersAvailable { category });
    }

    let mut last_error = None;
    let mut tried = 0;

    for provider in providers {
        if tried > 0 {
            FAILOVER_ATTEMPTS
                .with_label_values(&[operation.as_str()])
                .inc();
        }
        tried += 1;

        match call(Arc::clone(&provider)).await {
            Ok(Some(found)) if !found.foreign_id().is_empty() => {
                info!(
                    "{} '{}' resolved by {}",
                    operation,
                    foreign_id,
                    provider.name()
                );
                return Ok(found);
            }
            Ok(_) => debug!(
                "{} returned nothing for {} '{}'",
                provider.name(),
                operation,
                foreign_id
            ),
            Err(e) if e.is_not_supported() => debug!("{}", e),
            Err(e) => {
                warn!(
                    "{} failed for {} '{}', trying next provider: {}",
                    provider.name(),
                    operation,
                    foreign_id,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    warn!(
        "{} '{}' not found after trying {} provider(s)",
        operation, foreign_id, tried
    );
    Err(AggregationError::MetadataNotFound {
        category,
        id: foreign_id.to_string(),
        tried,
        source: last_error,
    })
}

/// Call every provider in order and deduplicate the combined results.
async fn merge<T, F, Fut>(providers: Vec<Arc<Provider>>, operation: Operation, call: F) -> Vec<T>
where
    T: ForeignKeyed,
    F: Fn(Arc<Provider>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, ProviderError>>,
{
    let mut combined = Vec::new();
    for provider in providers {
        match call(Arc::clone(&provider)).await {
            Ok(results) => {
                debug!(
                    "{} returned {} results for {}",
                    provider.name(),
                    results.len(),
                    operation
                );
                combined.extend(results);
            }
            Err(e) => skip(&provider, operation, &e),
        }
    }
    deduplicate(combined)
}

fn skip(provider: &Provider, operation: Operation, error: &ProviderError) {
    if error.is_not_supported() {
        debug!("{}", error);
    } else {
        warn!(
            "Skipping {} for {}: {}",
            provider.name(),
            operation,
            error
        );
    }
}

fn observe_results(operation: Operation, count: usize) {
    info!("{} returned {} merged results", operation, count);
    AGGREGATE_RESULTS
        .with_label_values(&[operation.as_str()])
        .observe(count as f64);
}

fn books_to_entities(books: Vec<Book>) -> Vec<SearchEntity> {
    books.into_iter().map(SearchEntity::Book).collect()
}
