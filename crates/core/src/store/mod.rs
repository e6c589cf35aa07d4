//! Persistence for provider definitions and provider health records.

mod sqlite;

pub use sqlite::SqliteMetadataStore;

use thiserror::Error;

use crate::provider::ProviderDefinition;
use crate::status::ProviderStatus;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with this id.
    #[error("Provider not found: {0}")]
    NotFound(i64),

    /// Underlying database failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Repository for provider definitions.
pub trait ProviderStore: Send + Sync {
    /// Persist a new definition. The stored copy, with its assigned id, is returned.
    fn insert(&self, definition: &ProviderDefinition) -> Result<ProviderDefinition, StoreError>;

    /// Replace an existing definition.
    fn update(&self, definition: &ProviderDefinition) -> Result<ProviderDefinition, StoreError>;

    /// Delete a definition together with its status row.
    fn delete(&self, id: i64) -> Result<(), StoreError>;

    /// Get a definition by id.
    fn find_by_id(&self, id: i64) -> Result<Option<ProviderDefinition>, StoreError>;

    /// Every definition, in insertion order.
    fn all(&self) -> Result<Vec<ProviderDefinition>, StoreError>;
}

/// Repository for provider health records.
pub trait StatusStore: Send + Sync {
    fn find_by_provider(&self, provider_id: i64) -> Result<Option<ProviderStatus>, StoreError>;

    fn all(&self) -> Result<Vec<ProviderStatus>, StoreError>;

    /// Insert or replace the row for `status.provider_id`.
    fn upsert(&self, status: &ProviderStatus) -> Result<(), StoreError>;

    fn delete_by_provider(&self, provider_id: i64) -> Result<(), StoreError>;
}
