//! Testing utilities and a mock metadata source.
//!
//! Public so that integration tests in this crate and in the server crate can
//! build providers without any network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use bookshelf_core::testing::{fixtures, MockMetadataSource};
//!
//! let source = MockMetadataSource::new("primary");
//! source.set_author_results(vec![fixtures::author("OL1A", "Ursula K. Le Guin")]).await;
//! source.set_next_error(ProviderError::RateLimited { retry_after_secs: None }).await;
//! ```

mod mock_source;

pub use mock_source::{MockMetadataSource, RecordedCall};

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::{MetadataSource, ProviderError};
use crate::registry::ProviderFactory;

/// Implementation key served by [`mock_factory`].
pub const MOCK_IMPLEMENTATION: &str = "Mock";

/// A factory whose `"Mock"` implementation hands out the given sources,
/// matched by definition name against source name.
pub fn mock_factory(sources: impl IntoIterator<Item = Arc<MockMetadataSource>>) -> ProviderFactory {
    let sources: HashMap<String, Arc<MockMetadataSource>> = sources
        .into_iter()
        .map(|source| (source.name().to_string(), source))
        .collect();

    let mut factory = ProviderFactory::new();
    factory.register(MOCK_IMPLEMENTATION, move |definition| {
        sources
            .get(&definition.name)
            .map(|source| Arc::clone(source) as Arc<dyn MetadataSource>)
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("no mock source named '{}'", definition.name))
            })
    });
    factory
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::metadata::{Author, AuthorMetadata, Book, BookInfo, Edition, Ratings};

    /// Create an author with reasonable defaults (enough works to avoid the sparse penalty).
    pub fn author(foreign_id: &str, name: &str) -> Author {
        Author {
            foreign_id: foreign_id.to_string(),
            name: name.to_string(),
            work_count: 20,
            ..Default::default()
        }
    }

    /// Create a fully populated author.
    pub fn detailed_author(foreign_id: &str, name: &str, work_count: u32) -> Author {
        Author {
            foreign_id: foreign_id.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
            overview: Some(format!("{} is a writer.", name)),
            birth_date: Some("1929".to_string()),
            death_date: Some("2018".to_string()),
            images: vec![format!("https://covers.example.org/a/{}.jpg", foreign_id)],
            ratings: Ratings {
                votes: 1000,
                value: 4.2,
            },
            work_count,
        }
    }

    /// Create a book credited to one author.
    pub fn book(foreign_id: &str, title: &str, author_foreign_id: &str) -> Book {
        Book {
            foreign_id: foreign_id.to_string(),
            title: title.to_string(),
            author_foreign_id: Some(author_foreign_id.to_string()),
            edition_count: 1,
            ..Default::default()
        }
    }

    /// Create a single edition.
    pub fn edition(foreign_id: &str, title: &str, isbn13: &str) -> Edition {
        Edition {
            foreign_id: foreign_id.to_string(),
            title: title.to_string(),
            isbn13: Some(isbn13.to_string()),
            ..Default::default()
        }
    }

    /// Create a book lookup result with one credited author.
    pub fn book_info(foreign_id: &str, title: &str, author: &Author) -> BookInfo {
        BookInfo {
            author_foreign_id: author.foreign_id.clone(),
            book: Book {
                author_name: Some(author.name.clone()),
                ..book(foreign_id, title, &author.foreign_id)
            },
            authors: vec![AuthorMetadata::from(author.clone())],
        }
    }
}
