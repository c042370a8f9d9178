use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::ProviderError;
use crate::provider::Provider;

type Factory = Arc<dyn Fn() -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Process-lifetime mapping from provider name to a lazily-constructed
/// provider instance.
///
/// Mirrors the teacher's cloud-keyed `DriverRegistry`, but keyed by provider
/// name and backed by a factory closure instead of pre-registered instances:
/// a provider is constructed once, on first use, not at registry-build time.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, Factory>>,
    loaded: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `name`. Overwrites any previous factory
    /// registered under the same name; does not evict an already-loaded
    /// instance.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().expect("provider registry poisoned");
        factories.insert(name.into(), Arc::new(factory));
    }

    /// Construct and cache the provider for `name` if it hasn't been loaded
    /// yet. Idempotent: later callers observe the same cached instance.
    /// Holds the write lock only for the duration of construction.
    pub fn load(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        if let Some(existing) = self.loaded.read().expect("provider registry poisoned").get(name) {
            return Ok(existing.clone());
        }

        let factory = {
            let factories = self.factories.read().expect("provider registry poisoned");
            factories
                .get(name)
                .cloned()
                .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?
        };

        let mut loaded = self.loaded.write().expect("provider registry poisoned");
        if let Some(existing) = loaded.get(name) {
            return Ok(existing.clone());
        }
        let provider = factory()?;
        loaded.insert(name.to_string(), provider.clone());
        Ok(provider)
    }

    /// Look up an already-loaded provider without constructing it.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.loaded
            .read()
            .expect("provider registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::ProviderNotFound(name.to_string()))
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().expect("provider registry poisoned").contains_key(name)
    }
}
