//! Builds metadata sources from provider definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::RegistryError;
use crate::provider::{MetadataSource, ProviderDefinition, ProviderError};

/// Builder closure for one implementation key.
pub type SourceBuilder = Arc<
    dyn Fn(&ProviderDefinition) -> Result<Arc<dyn MetadataSource>, ProviderError> + Send + Sync,
>;

/// Maps implementation keys to source builders.
#[derive(Clone, Default)]
pub struct ProviderFactory {
    builders: BTreeMap<String, SourceBuilder>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under an implementation key, replacing any previous one.
    pub fn register<F>(&mut self, implementation: impl Into<String>, builder: F) -> &mut Self
    where
        F: Fn(&ProviderDefinition) -> Result<Arc<dyn MetadataSource>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.builders.insert(implementation.into(), Arc::new(builder));
        self
    }

    /// Known implementation keys, sorted.
    pub fn implementations(&self) -> Vec<String> {
        self.builders.keys().cloned().collect()
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.builders.contains_key(implementation)
    }

    /// Build the source for a definition.
    pub fn build(
        &self,
        definition: &ProviderDefinition,
    ) -> Result<Arc<dyn MetadataSource>, RegistryError> {
        let builder = self
            .builders
            .get(&definition.implementation)
            .ok_or_else(|| RegistryError::UnknownImplementation(definition.implementation.clone()))?;
        Ok(builder(definition)?)
    }
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("implementations", &self.implementations())
            .finish()
    }
}
