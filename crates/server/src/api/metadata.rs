//! Metadata lookup and search API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bookshelf_core::{Author, Book, BookInfo, SearchEntity};

use super::error::{aggregation_error, api_error, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuthorParams {
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct TermParams {
    pub term: String,
}

#[derive(Debug, Deserialize)]
pub struct BookSearchParams {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub all_editions: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangedAuthorsParams {
    /// RFC 3339 timestamp.
    pub since: String,
}

#[derive(Debug, Serialize)]
pub struct ChangedAuthorsResponse {
    pub since: DateTime<Utc>,
    /// Sorted foreign ids.
    pub ids: Vec<String>,
}

// ============================================================================
// Lookups
// ============================================================================

/// GET /api/v1/metadata/author/{id}
pub async fn get_author(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<AuthorParams>,
) -> ApiResult<Author> {
    let author = state
        .metadata()
        .get_author_info(&id, params.use_cache)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(author))
}

/// GET /api/v1/metadata/book/{id}
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<BookInfo> {
    let info = state
        .metadata()
        .get_book_info(&id)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(info))
}

/// GET /api/v1/metadata/changed-authors?since=...
pub async fn changed_authors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChangedAuthorsParams>,
) -> ApiResult<ChangedAuthorsResponse> {
    let since = DateTime::parse_from_rfc3339(&params.since)
        .map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("invalid 'since' timestamp: {}", e),
            )
        })?
        .with_timezone(&Utc);

    let changed = state
        .metadata()
        .get_changed_authors(since)
        .await
        .map_err(aggregation_error)?;

    let mut ids: Vec<String> = changed.into_iter().collect();
    ids.sort();
    Ok(Json(ChangedAuthorsResponse { since, ids }))
}

// ============================================================================
// Searches
// ============================================================================

/// GET /api/v1/metadata/search/author?term=...
pub async fn search_authors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TermParams>,
) -> ApiResult<Vec<Author>> {
    let authors = state
        .metadata()
        .search_for_new_author(&params.term)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(authors))
}

/// GET /api/v1/metadata/search/book?title=...&author=...&all_editions=...
pub async fn search_books(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BookSearchParams>,
) -> ApiResult<Vec<Book>> {
    let author = params
        .author
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    let books = state
        .metadata()
        .search_for_new_book(&params.title, author, params.all_editions)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(books))
}

/// GET /api/v1/metadata/search/isbn/{isbn}
pub async fn search_isbn(
    State(state): State<Arc<AppState>>,
    Path(isbn): Path<String>,
) -> ApiResult<Vec<Book>> {
    let books = state
        .metadata()
        .search_by_isbn(&isbn)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(books))
}

/// GET /api/v1/metadata/search/asin/{asin}
pub async fn search_asin(
    State(state): State<Arc<AppState>>,
    Path(asin): Path<String>,
) -> ApiResult<Vec<Book>> {
    let books = state
        .metadata()
        .search_by_asin(&asin)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(books))
}

/// GET /api/v1/metadata/search?term=...
///
/// Interactive search. Accepts the prefixed forms (`isbn:`, `asin:`,
/// `author:`, `work:`) as well as free text.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TermParams>,
) -> ApiResult<Vec<SearchEntity>> {
    let entities = state
        .metadata()
        .search_for_new_entity(&params.term)
        .await
        .map_err(aggregation_error)?;
    Ok(Json(entities))
}
