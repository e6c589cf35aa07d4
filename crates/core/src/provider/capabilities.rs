//! Provider capability descriptor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a provider implementation supports.
///
/// Pure data, compared by value.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Author lookup and author search.
    #[serde(default)]
    pub author_search: bool,
    /// Book lookup and title search.
    #[serde(default)]
    pub book_search: bool,
    /// Search by ISBN.
    #[serde(default)]
    pub isbn_lookup: bool,
    /// Search by ASIN.
    #[serde(default)]
    pub asin_lookup: bool,
    /// Series information on books.
    #[serde(default)]
    pub series_info: bool,
    /// Incremental "changed authors since" feed.
    #[serde(default)]
    pub change_feed: bool,
    /// Cover images.
    #[serde(default)]
    pub covers: bool,
    /// Ratings.
    #[serde(default)]
    pub ratings: bool,
    /// Descriptions / biographies.
    #[serde(default)]
    pub descriptions: bool,
    /// Max requests per minute (0 = unlimited).
    #[serde(default)]
    pub max_requests_per_minute: u32,
}

impl ProviderCapabilities {
    /// Capabilities with every operation supported and no rate limit.
    pub fn all() -> Self {
        Self {
            author_search: true,
            book_search: true,
            isbn_lookup: true,
            asin_lookup: true,
            series_info: true,
            change_feed: true,
            covers: true,
            ratings: true,
            descriptions: true,
            max_requests_per_minute: 0,
        }
    }

    /// Whether the given operation is supported.
    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::GetAuthor | Operation::SearchAuthors => self.author_search,
            Operation::GetBook | Operation::SearchBooks => self.book_search,
            Operation::SearchIsbn => self.isbn_lookup,
            Operation::SearchAsin => self.asin_lookup,
            Operation::ChangedAuthors => self.change_feed,
            Operation::Test => true,
        }
    }
}

/// Operations of the uniform provider contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GetAuthor,
    GetBook,
    SearchAuthors,
    SearchBooks,
    SearchIsbn,
    SearchAsin,
    ChangedAuthors,
    Test,
}

impl Operation {
    /// Stable label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetAuthor => "get_author",
            Operation::GetBook => "get_book",
            Operation::SearchAuthors => "search_authors",
            Operation::SearchBooks => "search_books",
            Operation::SearchIsbn => "search_isbn",
            Operation::SearchAsin => "search_asin",
            Operation::ChangedAuthors => "changed_authors",
            Operation::Test => "test",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_supports_nothing_but_test() {
        let caps = ProviderCapabilities::default();
        assert!(!caps.supports(Operation::GetAuthor));
        assert!(!caps.supports(Operation::SearchIsbn));
        assert!(!caps.supports(Operation::ChangedAuthors));
        assert!(caps.supports(Operation::Test));
        assert_eq!(caps.max_requests_per_minute, 0);
    }

    #[test]
    fn test_author_flag_gates_lookup_and_search() {
        let caps = ProviderCapabilities {
            author_search: true,
            ..Default::default()
        };
        assert!(caps.supports(Operation::GetAuthor));
        assert!(caps.supports(Operation::SearchAuthors));
        assert!(!caps.supports(Operation::GetBook));
        assert!(!caps.supports(Operation::SearchBooks));
    }

    #[test]
    fn test_compared_by_value() {
        let a = ProviderCapabilities {
            isbn_lookup: true,
            max_requests_per_minute: 60,
            ..Default::default()
        };
        let b = ProviderCapabilities {
            isbn_lookup: true,
            max_requests_per_minute: 60,
            ..Default::default()
        };
        assert_eq!(a, b);
        assert_ne!(a, ProviderCapabilities::all());
    }

    #[test]
    fn test_operation_labels() {
        assert_eq!(Operation::SearchAsin.as_str(), "search_asin");
        assert_eq!(Operation::ChangedAuthors.to_string(), "changed_authors");
    }
}
