//! Domain entities returned by metadata providers.

use serde::{Deserialize, Serialize};

/// Anything carrying a provider-stable foreign identifier.
///
/// The aggregation layer uses this to deduplicate results coming from
/// different providers.
pub trait ForeignKeyed {
    /// The provider-stable identifier.
    fn foreign_id(&self) -> &str;

    /// Key space the identifier lives in. Ids only collide within one kind.
    fn kind(&self) -> &'static str {
        ""
    }
}

/// Aggregate rating information.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Ratings {
    /// Number of votes.
    #[serde(default)]
    pub votes: u32,
    /// Average rating (0-5).
    #[serde(default)]
    pub value: f32,
}

/// An author as returned by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Author {
    /// Provider-stable author ID.
    pub foreign_id: String,
    /// Display name.
    pub name: String,
    /// Alternate names and pen names.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Biography.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    /// Birth date as reported by the provider (free-form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    /// Death date as reported by the provider (free-form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    /// Portrait image URLs.
    #[serde(default)]
    pub images: Vec<String>,
    /// Aggregate ratings across the author's works.
    #[serde(default)]
    pub ratings: Ratings,
    /// Number of works credited to the author.
    #[serde(default)]
    pub work_count: u32,
}

impl ForeignKeyed for Author {
    fn foreign_id(&self) -> &str {
        &self.foreign_id
    }
}

/// A single edition of a book.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Edition {
    /// Provider-stable edition ID.
    pub foreign_id: String,
    /// Edition title (may differ from the work title).
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn13: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A book (work) as returned by a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Book {
    /// Provider-stable work ID.
    pub foreign_id: String,
    /// Work title.
    pub title: String,
    /// Foreign ID of the primary author, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_foreign_id: Option<String>,
    /// Name of the primary author, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Synopsis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    /// First publication date (free-form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    /// Subjects / genres.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Cover image URLs.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub ratings: Ratings,
    /// Known editions (may be empty when editions were not requested).
    #[serde(default)]
    pub editions: Vec<Edition>,
    /// Total number of editions the provider knows about.
    #[serde(default)]
    pub edition_count: u32,
}

impl ForeignKeyed for Book {
    fn foreign_id(&self) -> &str {
        &self.foreign_id
    }
}

/// Author details attached to a book lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorMetadata {
    pub foreign_id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_date: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl From<Author> for AuthorMetadata {
    fn from(author: Author) -> Self {
        Self {
            foreign_id: author.foreign_id,
            name: author.name,
            aliases: author.aliases,
            overview: author.overview,
            birth_date: author.birth_date,
            death_date: author.death_date,
            images: author.images,
        }
    }
}

/// Result of a book lookup by foreign ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookInfo {
    /// Foreign ID of the book's primary author.
    pub author_foreign_id: String,
    /// The book itself.
    pub book: Book,
    /// Metadata for every author credited on the book.
    #[serde(default)]
    pub authors: Vec<AuthorMetadata>,
}

impl ForeignKeyed for BookInfo {
    fn foreign_id(&self) -> &str {
        &self.book.foreign_id
    }
}

/// A combined search hit: either an author or a book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEntity {
    Author(Author),
    Book(Book),
}

impl SearchEntity {
    /// Name (authors) or title (books).
    pub fn display_name(&self) -> &str {
        match self {
            SearchEntity::Author(a) => &a.name,
            SearchEntity::Book(b) => &b.title,
        }
    }
}

impl ForeignKeyed for SearchEntity {
    fn foreign_id(&self) -> &str {
        match self {
            SearchEntity::Author(a) => &a.foreign_id,
            SearchEntity::Book(b) => &b.foreign_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            SearchEntity::Author(_) => "author",
            SearchEntity::Book(_) => "book",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_metadata_from_author() {
        let author = Author {
            foreign_id: "OL1A".to_string(),
            name: "Ursula K. Le Guin".to_string(),
            aliases: vec!["Ursula Le Guin".to_string()],
            birth_date: Some("1929".to_string()),
            work_count: 120,
            ..Default::default()
        };

        let meta = AuthorMetadata::from(author);
        assert_eq!(meta.foreign_id, "OL1A");
        assert_eq!(meta.aliases.len(), 1);
        assert_eq!(meta.birth_date.as_deref(), Some("1929"));
    }

    #[test]
    fn test_search_entity_serialization_is_tagged() {
        let entity = SearchEntity::Book(Book {
            foreign_id: "OL1W".to_string(),
            title: "The Dispossessed".to_string(),
            ..Default::default()
        });

        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "book");
        assert_eq!(json["title"], "The Dispossessed");
        assert_eq!(entity.foreign_id(), "OL1W");
        assert_eq!(entity.display_name(), "The Dispossessed");
    }

    #[test]
    fn test_author_deserialize_with_defaults() {
        let author: Author =
            serde_json::from_str(r#"{"foreign_id": "OL2A", "name": "Octavia Butler"}"#).unwrap();
        assert!(author.aliases.is_empty());
        assert_eq!(author.ratings.votes, 0);
        assert_eq!(author.work_count, 0);
    }
}
