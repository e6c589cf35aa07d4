//! Open Library HTTP client.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{
    OlAuthor, OlAuthorSearch, OlBookSearch, OlChange, OlEdition, OlListing, OlWork,
};
use super::OpenLibraryConfig;
use crate::metadata::{Author, AuthorMetadata, Book, BookInfo};
use crate::metrics::RATE_LIMIT_WAITS;
use crate::provider::{
    isbn_key, MetadataSource, ProviderCapabilities, ProviderDefinition, ProviderError,
    SlidingWindowLimiter,
};

/// Editions fetched alongside a work.
const EDITION_PAGE_SIZE: u32 = 50;
/// Entries per `/recentchanges.json` page.
const CHANGES_PAGE_SIZE: u32 = 1000;
/// Upper bound on change-feed pages walked per call.
const MAX_CHANGE_PAGES: u32 = 10;

const SEARCH_FIELDS: &str = "key,title,author_key,author_name,first_publish_year,cover_i,\
edition_count,ratings_average,ratings_count,subject";

/// Open Library source.
pub struct OpenLibrarySource {
    name: String,
    client: Client,
    config: OpenLibraryConfig,
    limiter: SlidingWindowLimiter,
}

impl OpenLibrarySource {
    /// Create a new Open Library source.
    pub fn new(name: impl Into<String>, config: OpenLibraryConfig) -> Result<Self, ProviderError> {
        let name = name.into();
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            limiter: SlidingWindowLimiter::new(name.clone(), config.requests_per_minute),
            name,
            client,
            config,
        })
    }

    /// Build a source for a provider definition, applying its settings overrides.
    pub fn from_definition(
        config: &OpenLibraryConfig,
        definition: &ProviderDefinition,
    ) -> Result<Self, ProviderError> {
        let config = config.with_settings(&definition.settings)?;
        Self::new(definition.name.clone(), config)
    }

    pub fn config(&self) -> &OpenLibraryConfig {
        &self.config
    }

    /// GET a JSON document, honouring the rate limit.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let waited = self.limiter.acquire().await;
        if !waited.is_zero() {
            RATE_LIMIT_WAITS.with_label_values(&[self.name.as_str()]).inc();
        }

        let url = format!("{}{}", self.config.base_url, path);
        debug!("Open Library GET {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(
                "Open Library rate limit exceeded (retry after {:?}s)",
                retry_after_secs
            );
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        response.json().await.map_err(|e| {
            ProviderError::Parse(format!("Failed to parse {} response: {}", path, e))
        })
    }

    /// Credited author metadata. Authors that no longer exist are skipped.
    async fn credited_authors(&self, ids: &[String]) -> Result<Vec<AuthorMetadata>, ProviderError> {
        let lookups = ids.iter().map(|id| async move {
            let path = format!("/authors/{}.json", urlencoding::encode(id));
            self.get_json::<OlAuthor>(&path, &[]).await
        });

        let mut authors = Vec::with_capacity(ids.len());
        for result in join_all(lookups).await {
            match result {
                Ok(author) => authors.push(author.into_author(&self.config.covers_url, 0).into()),
                Err(e) if e.is_not_found() => debug!("Skipping missing credited author: {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(authors)
    }
}

/// Turn a 404 into "no such entity".
fn found<T>(result: Result<T, ProviderError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl MetadataSource for OpenLibrarySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            author_search: true,
            book_search: true,
            isbn_lookup: true,
            asin_lookup: false,
            series_info: false,
            change_feed: true,
            covers: true,
            ratings: true,
            descriptions: true,
            max_requests_per_minute: self.config.requests_per_minute,
        }
    }

    async fn fetch_author(&self, foreign_id: &str) -> Result<Option<Author>, ProviderError> {
        let id = urlencoding::encode(foreign_id);
        let Some(author) = found(
            self.get_json::<OlAuthor>(&format!("/authors/{}.json", id), &[])
                .await,
        )?
        else {
            return Ok(None);
        };

        let works = found(
            self.get_json::<OlListing<serde_json::Value>>(
                &format!("/authors/{}/works.json", id),
                &[("limit", "1".to_string())],
            )
            .await,
        )?;
        let work_count = works.map(|w| w.size).unwrap_or(0);

        Ok(Some(author.into_author(&self.config.covers_url, work_count)))
    }

    async fn fetch_book(&self, foreign_id: &str) -> Result<Option<BookInfo>, ProviderError> {
        let id = urlencoding::encode(foreign_id);
        let Some(work) = found(
            self.get_json::<OlWork>(&format!("/works/{}.json", id), &[])
                .await,
        )?
        else {
            return Ok(None);
        };

        let editions = found(
            self.get_json::<OlListing<OlEdition>>(
                &format!("/works/{}/editions.json", id),
                &[("limit", EDITION_PAGE_SIZE.to_string())],
            )
            .await,
        )?;
        let (edition_count, editions) = match editions {
            Some(listing) => (
                listing.size,
                listing
                    .entries
                    .into_iter()
                    .map(|e| e.into_edition(&self.config.covers_url))
                    .collect(),
            ),
            None => (0, Vec::new()),
        };

        let authors = self.credited_authors(&work.author_ids()).await?;
        let author_foreign_id = authors
            .first()
            .map(|a| a.foreign_id.clone())
            .unwrap_or_default();
        let book = work.into_book(
            &self.config.covers_url,
            editions,
            edition_count,
            authors.first(),
        );

        Ok(Some(BookInfo {
            author_foreign_id,
            book,
            authors,
        }))
    }

    async fn search_authors(&self, query: &str) -> Result<Vec<Author>, ProviderError> {
        let response: OlAuthorSearch = self
            .get_json(
                "/search/authors.json",
                &[
                    ("q", query.to_string()),
                    ("limit", self.config.search_limit.to_string()),
                ],
            )
            .await?;

        Ok(response
            .docs
            .into_iter()
            .map(|doc| doc.into_author(&self.config.covers_url))
            .collect())
    }

    async fn search_books(
        &self,
        title: &str,
        author: Option<&str>,
        all_editions: bool,
    ) -> Result<Vec<Book>, ProviderError> {
        let fields = if all_editions {
            format!("{},editions", SEARCH_FIELDS)
        } else {
            SEARCH_FIELDS.to_string()
        };

        let mut query = vec![
            ("title", title.to_string()),
            ("limit", self.config.search_limit.to_string()),
            ("fields", fields),
        ];
        if let Some(author) = author.filter(|a| !a.trim().is_empty()) {
            query.push(("author", author.to_string()));
        }

        let response: OlBookSearch = self.get_json("/search.json", &query).await?;
        Ok(response
            .docs
            .into_iter()
            .map(|doc| doc.into_book(&self.config.covers_url))
            .collect())
    }

    async fn search_isbn(&self, isbn: &str) -> Result<Vec<Book>, ProviderError> {
        let isbn = isbn_key(isbn);
        let path = format!("/isbn/{}.json", urlencoding::encode(&isbn));
        let Some(edition) = found(self.get_json::<OlEdition>(&path, &[]).await)? else {
            return Ok(Vec::new());
        };

        let Some(work_id) = edition.work_id() else {
            debug!("ISBN {} has no work", isbn);
            return Ok(Vec::new());
        };

        let Some(info) = self.fetch_book(&work_id).await? else {
            return Ok(Vec::new());
        };

        // Put the matched edition first.
        let mut book = info.book;
        let matched = edition.into_edition(&self.config.covers_url);
        book.editions.retain(|e| e.foreign_id != matched.foreign_id);
        book.editions.insert(0, matched);
        book.edition_count = book.edition_count.max(book.editions.len() as u32);

        Ok(vec![book])
    }

    async fn changed_authors(
        &self,
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, ProviderError> {
        let mut changed = HashSet::new();

        for page in 0..MAX_CHANGE_PAGES {
            let entries: Vec<OlChange> = self
                .get_json(
                    "/recentchanges.json",
                    &[
                        ("limit", CHANGES_PAGE_SIZE.to_string()),
                        ("offset", (page * CHANGES_PAGE_SIZE).to_string()),
                    ],
                )
                .await?;
            if entries.is_empty() {
                break;
            }

            // Newest first: stop once we walk past `since`.
            let mut reached_since = false;
            for entry in &entries {
                match entry.timestamp() {
                    Some(ts) if ts < since => reached_since = true,
                    Some(_) => changed.extend(entry.author_ids()),
                    None => warn!("Unparseable change timestamp '{}'", entry.timestamp),
                }
            }
            if reached_since {
                break;
            }
        }

        debug!("Open Library: {} authors changed since {}", changed.len(), since);
        Ok(changed)
    }

    async fn test(&self) -> Result<(), ProviderError> {
        let _: OlAuthorSearch = self
            .get_json(
                "/search/authors.json",
                &[("q", "tolkien".to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(())
    }
}
