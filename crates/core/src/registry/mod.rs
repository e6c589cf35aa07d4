//! Provider registry: turns configured definitions into the ordered,
//! filtered list of runnable providers for an operation category.

mod factory;
mod providers;

pub use factory::{ProviderFactory, SourceBuilder};
pub use providers::{ProviderRegistry, ProviderTemplate};

use thiserror::Error;

use crate::provider::{ProviderError, ValidationResult};
use crate::store::StoreError;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Provider not found: {0}")]
    NotFound(i64),

    #[error("Unknown provider implementation: {0}")]
    UnknownImplementation(String),

    #[error("Invalid provider definition: {0}")]
    Validation(ValidationResult),

    #[error("Failed to build provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => RegistryError::NotFound(id),
            other => RegistryError::Store(other),
        }
    }
}
