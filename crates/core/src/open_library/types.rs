//! Open Library wire types and their conversion into domain entities.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::metadata::{Author, AuthorMetadata, Book, Edition, Ratings};

// ============================================================================
// Identifiers and images
// ============================================================================

/// Strip the `/authors/`, `/works/` or `/books/` prefix from an Open Library key.
pub(super) fn strip_key(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

/// Cover or portrait URLs for the given image ids. Open Library uses -1 for "none".
pub(super) fn image_urls(covers_url: &str, kind: &str, ids: &[i64]) -> Vec<String> {
    ids.iter()
        .filter(|id| **id > 0)
        .map(|id| format!("{}/{}/id/{}-L.jpg", covers_url, kind, id))
        .collect()
}

/// Free text fields are either a bare string or `{"type": "/type/text", "value": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum OlText {
    Plain(String),
    Typed { value: String },
}

impl OlText {
    fn into_string(self) -> String {
        match self {
            OlText::Plain(s) | OlText::Typed { value: s } => s,
        }
    }
}

fn text(value: Option<OlText>) -> Option<String> {
    value
        .map(OlText::into_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub(super) struct OlKeyRef {
    pub key: String,
}

// ============================================================================
// Authors
// ============================================================================

/// `/authors/{id}.json`
#[derive(Debug, Deserialize)]
pub(super) struct OlAuthor {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub personal_name: Option<String>,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    #[serde(default)]
    pub bio: Option<OlText>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub photos: Vec<i64>,
}

impl OlAuthor {
    pub fn into_author(self, covers_url: &str, work_count: u32) -> Author {
        let name = self
            .name
            .or(self.personal_name)
            .unwrap_or_default();
        Author {
            foreign_id: strip_key(&self.key),
            aliases: self
                .alternate_names
                .into_iter()
                .filter(|alias| *alias != name)
                .collect(),
            name,
            overview: text(self.bio),
            birth_date: self.birth_date,
            death_date: self.death_date,
            images: image_urls(covers_url, "a", &self.photos),
            ratings: Ratings::default(),
            work_count,
        }
    }
}

/// Paged listing envelope (`works.json`, `editions.json`).
#[derive(Debug, Deserialize)]
pub(super) struct OlListing<T> {
    #[serde(default)]
    pub size: u32,
    #[serde(default = "Vec::new")]
    pub entries: Vec<T>,
}

/// `/search/authors.json`
#[derive(Debug, Deserialize)]
pub(super) struct OlAuthorSearch {
    #[serde(default)]
    pub docs: Vec<OlAuthorDoc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OlAuthorDoc {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub work_count: u32,
    #[serde(default)]
    pub ratings_average: Option<f32>,
    #[serde(default)]
    pub ratings_count: Option<u32>,
}

impl OlAuthorDoc {
    pub fn into_author(self, covers_url: &str) -> Author {
        let foreign_id = strip_key(&self.key);
        Author {
            images: vec![format!("{}/a/olid/{}-L.jpg", covers_url, foreign_id)],
            foreign_id,
            name: self.name,
            aliases: self.alternate_names,
            overview: None,
            birth_date: self.birth_date,
            death_date: self.death_date,
            ratings: ratings(self.ratings_average, self.ratings_count),
            work_count: self.work_count,
        }
    }
}

fn ratings(average: Option<f32>, count: Option<u32>) -> Ratings {
    Ratings {
        votes: count.unwrap_or(0),
        value: average.unwrap_or(0.0),
    }
}

// ============================================================================
// Works and editions
// ============================================================================

/// `/works/{id}.json`
#[derive(Debug, Deserialize)]
pub(super) struct OlWork {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<OlWorkAuthor>,
    #[serde(default)]
    pub description: Option<OlText>,
    #[serde(default)]
    pub first_publish_date: Option<String>,
    #[serde(default)]
    pub covers: Vec<i64>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OlWorkAuthor {
    pub author: OlKeyRef,
}

impl OlWork {
    /// Foreign ids of the credited authors, in credit order.
    pub fn author_ids(&self) -> Vec<String> {
        self.authors
            .iter()
            .map(|credit| strip_key(&credit.author.key))
            .collect()
    }

    pub fn into_book(
        self,
        covers_url: &str,
        editions: Vec<Edition>,
        edition_count: u32,
        primary: Option<&AuthorMetadata>,
    ) -> Book {
        let title = match self.subtitle {
            Some(subtitle) if !subtitle.is_empty() => format!("{}: {}", self.title, subtitle),
            _ => self.title,
        };
        Book {
            foreign_id: strip_key(&self.key),
            title,
            author_foreign_id: primary.map(|a| a.foreign_id.clone()),
            author_name: primary.map(|a| a.name.clone()),
            overview: text(self.description),
            release_date: self.first_publish_date,
            genres: self.subjects,
            images: image_urls(covers_url, "b", &self.covers),
            ratings: Ratings::default(),
            edition_count: edition_count.max(editions.len() as u32),
            editions,
        }
    }
}

/// An edition, from `/works/{id}/editions.json` or `/isbn/{isbn}.json`.
#[derive(Debug, Deserialize)]
pub(super) struct OlEdition {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub works: Vec<OlKeyRef>,
    #[serde(default)]
    pub isbn_13: Vec<String>,
    #[serde(default)]
    pub isbn_10: Vec<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub languages: Vec<OlKeyRef>,
    #[serde(default)]
    pub physical_format: Option<String>,
    #[serde(default)]
    pub number_of_pages: Option<u32>,
    #[serde(default)]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub covers: Vec<i64>,
    #[serde(default)]
    pub identifiers: Option<OlIdentifiers>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct OlIdentifiers {
    #[serde(default)]
    pub amazon: Vec<String>,
}

impl OlEdition {
    pub fn work_id(&self) -> Option<String> {
        self.works.first().map(|work| strip_key(&work.key))
    }

    pub fn into_edition(self, covers_url: &str) -> Edition {
        Edition {
            foreign_id: strip_key(&self.key),
            title: self.title,
            isbn13: self
                .isbn_13
                .into_iter()
                .next()
                .or_else(|| self.isbn_10.into_iter().next()),
            asin: self
                .identifiers
                .and_then(|ids| ids.amazon.into_iter().next()),
            publisher: self.publishers.into_iter().next(),
            language: self.languages.first().map(|lang| strip_key(&lang.key)),
            format: self.physical_format,
            page_count: self.number_of_pages,
            release_date: self.publish_date,
            images: image_urls(covers_url, "b", &self.covers),
        }
    }
}

// ============================================================================
// Book search
// ============================================================================

/// `/search.json`
#[derive(Debug, Deserialize)]
pub(super) struct OlBookSearch {
    #[serde(default)]
    pub docs: Vec<OlBookDoc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OlBookDoc {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_key: Vec<String>,
    #[serde(default)]
    pub author_name: Vec<String>,
    #[serde(default)]
    pub first_publish_year: Option<i32>,
    #[serde(default)]
    pub cover_i: Option<i64>,
    #[serde(default)]
    pub edition_count: u32,
    #[serde(default)]
    pub ratings_average: Option<f32>,
    #[serde(default)]
    pub ratings_count: Option<u32>,
    #[serde(default)]
    pub subject: Vec<String>,
    #[serde(default)]
    pub editions: Option<OlEditionDocs>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OlEditionDocs {
    #[serde(default)]
    pub docs: Vec<OlEditionDoc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OlEditionDoc {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub isbn: Vec<String>,
    #[serde(default)]
    pub publisher: Vec<String>,
    #[serde(default)]
    pub language: Vec<String>,
    #[serde(default)]
    pub cover_i: Option<i64>,
    #[serde(default)]
    pub publish_date: Vec<String>,
}

impl OlBookDoc {
    pub fn into_book(self, covers_url: &str) -> Book {
        let editions: Vec<Edition> = self
            .editions
            .map(|e| e.docs)
            .unwrap_or_default()
            .into_iter()
            .map(|doc| Edition {
                foreign_id: strip_key(&doc.key),
                title: doc.title,
                isbn13: doc
                    .isbn
                    .iter()
                    .find(|isbn| isbn.len() == 13)
                    .or(doc.isbn.first())
                    .cloned(),
                asin: None,
                publisher: doc.publisher.into_iter().next(),
                language: doc.language.into_iter().next(),
                format: None,
                page_count: None,
                release_date: doc.publish_date.into_iter().next(),
                images: image_urls(covers_url, "b", &doc.cover_i.into_iter().collect::<Vec<_>>()),
            })
            .collect();

        Book {
            foreign_id: strip_key(&self.key),
            title: self.title,
            author_foreign_id: self.author_key.into_iter().next(),
            author_name: self.author_name.into_iter().next(),
            overview: None,
            release_date: self.first_publish_year.map(|year| year.to_string()),
            genres: self.subject.into_iter().take(10).collect(),
            images: image_urls(covers_url, "b", &self.cover_i.into_iter().collect::<Vec<_>>()),
            ratings: ratings(self.ratings_average, self.ratings_count),
            edition_count: self.edition_count.max(editions.len() as u32),
            editions,
        }
    }
}

// ============================================================================
// Recent changes
// ============================================================================

/// One entry of `/recentchanges.json`.
#[derive(Debug, Deserialize)]
pub(super) struct OlChange {
    pub timestamp: String,
    #[serde(default)]
    pub changes: Vec<OlKeyRef>,
}

impl OlChange {
    /// Change timestamps are naive ISO 8601 in UTC, with optional fractional seconds.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Foreign ids of the authors touched by this change.
    pub fn author_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.changes
            .iter()
            .filter(|change| change.key.starts_with("/authors/"))
            .map(|change| strip_key(&change.key))
    }
}
