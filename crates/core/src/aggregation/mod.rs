//! Metadata aggregation across providers.
//!
//! This module provides:
//! - [`AggregationService`]: failover for lookups, merging for searches
//! - Deduplication by foreign id
//! - The relevance gate and scoring used to rank noisy search results
//! - Parsing of interactive search terms

mod dedup;
pub mod relevance;
mod service;
mod term;

pub use dedup::deduplicate;
pub use service::AggregationService;
pub use term::{looks_like_isbn, parse_search_term, SearchTerm};

use thiserror::Error;

use crate::provider::{ProviderCategory, ProviderError};
use crate::registry::RegistryError;

/// Operation-level failures surfaced to callers.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// No enabled, unblocked provider exists for the category.
    #[error("No metadata providers available for {category}")]
    NoProvidersAvailable { category: ProviderCategory },

    /// Every eligible provider was tried without a usable result.
    #[error("Metadata not found for '{id}' ({category}, {tried} provider(s) tried)")]
    MetadataNotFound {
        category: ProviderCategory,
        id: String,
        tried: usize,
        #[source]
        source: Option<ProviderError>,
    },

    /// Provider definitions could not be loaded.
    #[error("Failed to load providers: {0}")]
    Registry(#[from] RegistryError),
}
