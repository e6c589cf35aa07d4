//! Persisted provider configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::ProviderStatus;

/// Priority used when neither the user nor the implementation expresses one.
pub const DEFAULT_PRIORITY: u8 = 50;
/// Lowest valid priority.
pub const MIN_PRIORITY: u8 = 1;
/// Highest valid priority.
pub const MAX_PRIORITY: u8 = 100;

/// Operation category used to select providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCategory {
    AuthorSearch,
    BookSearch,
    AutomaticRefresh,
    /// Union of author and book search.
    InteractiveSearch,
}

impl ProviderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderCategory::AuthorSearch => "author_search",
            ProviderCategory::BookSearch => "book_search",
            ProviderCategory::AutomaticRefresh => "automatic_refresh",
            ProviderCategory::InteractiveSearch => "interactive_search",
        }
    }
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured metadata provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDefinition {
    /// Storage ID (0 = not yet persisted).
    #[serde(default)]
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Implementation key understood by the provider factory.
    pub implementation: String,
    /// Higher is queried first (1-100).
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub enable_author_search: bool,
    #[serde(default)]
    pub enable_book_search: bool,
    #[serde(default)]
    pub enable_automatic_refresh: bool,
    /// Implementation-specific settings.
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Health record (read-only, filled in when listing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProviderStatus>,
}

impl ProviderDefinition {
    /// Create a definition with every category enabled and default priority.
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            implementation: implementation.into(),
            priority: DEFAULT_PRIORITY,
            enable_author_search: true,
            enable_book_search: true,
            enable_automatic_refresh: true,
            settings: serde_json::Value::Null,
            tags: Vec::new(),
            status: None,
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the category flags.
    pub fn with_flags(mut self, author: bool, book: bool, refresh: bool) -> Self {
        self.enable_author_search = author;
        self.enable_book_search = book;
        self.enable_automatic_refresh = refresh;
        self
    }

    /// Set the implementation settings.
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// A definition with every flag off is inert.
    pub fn enabled(&self) -> bool {
        self.enable_author_search || self.enable_book_search || self.enable_automatic_refresh
    }

    /// Whether the definition is enabled for the given category.
    pub fn enabled_for(&self, category: ProviderCategory) -> bool {
        match category {
            ProviderCategory::AuthorSearch => self.enable_author_search,
            ProviderCategory::BookSearch => self.enable_book_search,
            ProviderCategory::AutomaticRefresh => self.enable_automatic_refresh,
            ProviderCategory::InteractiveSearch => {
                self.enable_author_search || self.enable_book_search
            }
        }
    }

    /// Whether this definition has been persisted.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Same configuration, ignoring the attached status.
    pub fn same_config(&self, other: &ProviderDefinition) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.implementation == other.implementation
            && self.priority == other.priority
            && self.enable_author_search == other.enable_author_search
            && self.enable_book_search == other.enable_book_search
            && self.enable_automatic_refresh == other.enable_automatic_refresh
            && self.settings == other.settings
            && self.tags == other.tags
    }
}

/// A single validation problem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Field the problem relates to (empty for general failures).
    pub property: String,
    pub message: String,
}

/// Outcome of validating or testing a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationResult {
    #[serde(default)]
    pub errors: Vec<ValidationFailure>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    /// A result carrying a single failure.
    pub fn failure(property: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::default();
        result.add(property, message);
        result
    }

    pub fn add(&mut self, property: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationFailure {
            property: property.into(),
            message: message.into(),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .map(|e| {
                if e.property.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.property, e.message)
                }
            })
            .collect();
        f.write_str(&messages.join("; "))
    }
}
