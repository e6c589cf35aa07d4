//! The provider registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::{ProviderFactory, RegistryError};
use crate::provider::{
    CacheSettings, MetadataSource, Provider, ProviderCapabilities, ProviderCategory,
    ProviderDefinition, ValidationResult, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::status::StatusTracker;
use crate::store::ProviderStore;

/// Defaults a new definition of one implementation starts from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProviderTemplate {
    pub implementation: String,
    pub priority: u8,
    pub capabilities: ProviderCapabilities,
}

/// Composes stored definitions, status and the factory into runnable providers.
///
/// Built providers are memoised per definition id so each keeps its own rate
/// limit window and caches. An entry is rebuilt when its definition changes.
pub struct ProviderRegistry {
    store: Arc<dyn ProviderStore>,
    status: Arc<StatusTracker>,
    factory: ProviderFactory,
    cache_settings: CacheSettings,
    call_timeout: Duration,
    instances: RwLock<HashMap<i64, Arc<Provider>>>,
}

impl ProviderRegistry {
    pub fn new(
        store: Arc<dyn ProviderStore>,
        status: Arc<StatusTracker>,
        factory: ProviderFactory,
        cache_settings: CacheSettings,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            status,
            factory,
            cache_settings,
            call_timeout,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn status_tracker(&self) -> &Arc<StatusTracker> {
        &self.status
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Providers enabled for a category, highest priority first.
    ///
    /// Ties keep storage order. With `filter_blocked`, providers currently
    /// suspended by the status tracker are dropped.
    pub fn by_category(
        &self,
        category: ProviderCategory,
        filter_blocked: bool,
    ) -> Result<Vec<Arc<Provider>>, RegistryError> {
        self.select(|def| def.enabled_for(category), filter_blocked)
    }

    /// Every enabled provider, highest priority first.
    pub fn get_by_priority(&self, filter_blocked: bool) -> Result<Vec<Arc<Provider>>, RegistryError> {
        self.select(ProviderDefinition::enabled, filter_blocked)
    }

    fn select(
        &self,
        include: impl Fn(&ProviderDefinition) -> bool,
        filter_blocked: bool,
    ) -> Result<Vec<Arc<Provider>>, RegistryError> {
        let mut definitions: Vec<ProviderDefinition> = self
            .store
            .all()?
            .into_iter()
            .filter(|def| def.enabled() && include(def))
            .collect();

        if filter_blocked {
            let blocked: HashSet<i64> = self
                .status
                .blocked_providers()
                .into_iter()
                .map(|s| s.provider_id)
                .collect();
            definitions.retain(|def| !blocked.contains(&def.id));
        }

        // Stable sort: equal priorities keep storage order.
        definitions.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut providers = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            match self.instance(definition) {
                Ok(provider) => providers.push(provider),
                Err(e) => warn!("Skipping provider '{}': {}", definition.name, e),
            }
        }
        Ok(providers)
    }

    fn instance(&self, definition: &ProviderDefinition) -> Result<Arc<Provider>, RegistryError> {
        {
            let instances = self.instances.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(provider) = instances.get(&definition.id) {
                if provider.definition().same_config(definition) {
                    return Ok(Arc::clone(provider));
                }
            }
        }

        let source = self.factory.build(definition)?;
        let mut definition = definition.clone();
        definition.status = None;
        let provider = Arc::new(Provider::new(
            definition,
            source,
            Arc::clone(&self.status),
            self.cache_settings,
            self.call_timeout,
        ));

        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.id(), Arc::clone(&provider));
        Ok(provider)
    }

    fn forget(&self, id: i64) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Every definition with its status attached.
    pub fn all(&self) -> Result<Vec<ProviderDefinition>, RegistryError> {
        Ok(self
            .store
            .all()?
            .into_iter()
            .map(|def| self.with_status(def))
            .collect())
    }

    pub fn get(&self, id: i64) -> Result<ProviderDefinition, RegistryError> {
        self.store
            .find_by_id(id)?
            .map(|def| self.with_status(def))
            .ok_or(RegistryError::NotFound(id))
    }

    /// Find a definition by name, ignoring case.
    pub fn find(&self, name: &str) -> Result<Option<ProviderDefinition>, RegistryError> {
        let name = name.trim().to_lowercase();
        Ok(self
            .store
            .all()?
            .into_iter()
            .find(|def| def.name.to_lowercase() == name)
            .map(|def| self.with_status(def)))
    }

    pub fn exists(&self, id: i64) -> Result<bool, RegistryError> {
        Ok(self.store.find_by_id(id)?.is_some())
    }

    /// Persist a new definition.
    pub fn create(&self, definition: ProviderDefinition) -> Result<ProviderDefinition, RegistryError> {
        let mut definition = definition;
        definition.id = 0;
        definition.status = None;
        if definition.priority == 0 {
            definition.priority = DEFAULT_PRIORITY;
        }

        let source = self.checked_source(&definition)?;
        // New definitions adopt the source's suggested priority when it has one.
        let suggested = source.default_priority();
        if suggested != 0 {
            definition.priority = suggested;
        }

        let stored = self.store.insert(&definition)?;
        info!(
            "Created provider '{}' ({}) with priority {}",
            stored.name, stored.implementation, stored.priority
        );
        Ok(self.with_status(stored))
    }

    /// Replace an existing definition.
    pub fn update(&self, definition: ProviderDefinition) -> Result<ProviderDefinition, RegistryError> {
        if !self.exists(definition.id)? {
            return Err(RegistryError::NotFound(definition.id));
        }

        let mut definition = definition;
        definition.status = None;
        self.checked_source(&definition)?;

        let stored = self.store.update(&definition)?;
        self.forget(stored.id);
        info!("Updated provider '{}'", stored.name);
        Ok(self.with_status(stored))
    }

    /// Delete a definition and its status.
    pub fn delete(&self, id: i64) -> Result<(), RegistryError> {
        self.store.delete(id)?;
        self.forget(id);
        info!("Deleted provider {}", id);
        Ok(())
    }

    /// Insert the given definitions if none are stored yet. Returns how many were inserted.
    pub fn seed(&self, definitions: Vec<ProviderDefinition>) -> Result<usize, RegistryError> {
        if !self.store.all()?.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        for definition in definitions {
            self.create(definition)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Check a definition without persisting it.
    ///
    /// A definition whose source cannot be built from its settings is invalid.
    pub fn validate(&self, definition: &ProviderDefinition) -> Result<ValidationResult, RegistryError> {
        Ok(self.validate_and_build(definition)?.0)
    }

    /// Validate a definition and return its source, or fail with the validation errors.
    fn checked_source(
        &self,
        definition: &ProviderDefinition,
    ) -> Result<Arc<dyn MetadataSource>, RegistryError> {
        match self.validate_and_build(definition)? {
            (validation, Some(source)) if validation.is_valid() => Ok(source),
            (validation, _) => Err(RegistryError::Validation(validation)),
        }
    }

    fn validate_and_build(
        &self,
        definition: &ProviderDefinition,
    ) -> Result<(ValidationResult, Option<Arc<dyn MetadataSource>>), RegistryError> {
        let mut result = ValidationResult::ok();

        let name = definition.name.trim();
        if name.is_empty() {
            result.add("name", "must not be empty");
        } else {
            let lowered = name.to_lowercase();
            let duplicate = self
                .store
                .all()?
                .iter()
                .any(|other| other.id != definition.id && other.name.trim().to_lowercase() == lowered);
            if duplicate {
                result.add("name", format!("a provider named '{}' already exists", name));
            }
        }

        let mut source = None;
        if !self.factory.contains(&definition.implementation) {
            result.add(
                "implementation",
                format!("unknown implementation '{}'", definition.implementation),
            );
        } else {
            match self.factory.build(definition) {
                Ok(built) => source = Some(built),
                Err(RegistryError::Provider(e)) => result.add("settings", e.to_string()),
                Err(e) => result.add("implementation", e.to_string()),
            }
        }

        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&definition.priority) {
            result.add(
                "priority",
                format!("must be between {} and {}", MIN_PRIORITY, MAX_PRIORITY),
            );
        }

        Ok((result, source))
    }

    /// Run a definition's connectivity check.
    ///
    /// The outcome is recorded with the status tracker only for persisted
    /// definitions; unsaved ones are tested without touching it.
    pub async fn test(&self, definition: &ProviderDefinition) -> ValidationResult {
        let source = match self.factory.build(definition) {
            Ok(source) => source,
            Err(e) => return ValidationResult::failure("implementation", e.to_string()),
        };

        let mut check_definition = definition.clone();
        check_definition.status = None;
        let provider = Provider::new(
            check_definition,
            source,
            Arc::clone(&self.status),
            self.cache_settings,
            self.call_timeout,
        );

        let outcome = provider.check_connectivity().await;
        if definition.is_persisted() {
            match &outcome {
                Ok(()) => {
                    self.status.record_success(definition.id);
                }
                Err(e) => {
                    self.status.record_failure(definition.id, e.minimum_backoff());
                }
            }
        }

        match outcome {
            Ok(()) => ValidationResult::ok(),
            Err(e) => {
                warn!("Provider test for '{}' failed: {}", definition.name, e);
                ValidationResult::failure("", e.to_string())
            }
        }
    }

    /// Starting point for a new definition of every known implementation.
    pub fn schema(&self) -> Vec<ProviderTemplate> {
        self.factory
            .implementations()
            .into_iter()
            .filter_map(|implementation| {
                let definition = ProviderDefinition::new(implementation.clone(), implementation.clone());
                let source = self.factory.build(&definition).ok()?;
                let suggested = source.default_priority();
                Some(ProviderTemplate {
                    implementation,
                    priority: if suggested != 0 { suggested } else { DEFAULT_PRIORITY },
                    capabilities: source.capabilities(),
                })
            })
            .collect()
    }

    fn with_status(&self, mut definition: ProviderDefinition) -> ProviderDefinition {
        definition.status = Some(self.status.status(definition.id));
        definition
    }
}
