pub mod aggregation;
pub mod config;
pub mod metadata;
pub mod metrics;
pub mod open_library;
pub mod provider;
pub mod registry;
pub mod status;
pub mod store;
pub mod testing;

pub use aggregation::{AggregationError, AggregationService, SearchTerm};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use metadata::{Author, AuthorMetadata, Book, BookInfo, Edition, Ratings, SearchEntity};
pub use open_library::{OpenLibraryConfig, OpenLibrarySource};
pub use provider::{
    MetadataSource, Operation, Provider, ProviderCapabilities, ProviderCategory,
    ProviderDefinition, ProviderError, ValidationResult,
};
pub use registry::{ProviderFactory, ProviderRegistry, RegistryError};
pub use status::{BackoffPolicy, ProviderStatus, StatusTracker};
pub use store::{ProviderStore, SqliteMetadataStore, StatusStore, StoreError};
