//! Provider registry
//!
//! Built once at startup and shared as `Arc<ProviderRegistry>`. Providers are
//! written exactly once; every read after that is lock-free.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

use super::ContentProvider;
use crate::models::ProviderTag;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider registry already initialized")]
    AlreadyInitialized,
    #[error("Provider {0} registered twice")]
    DuplicateTag(ProviderTag),
}

struct Slots {
    order: Vec<ProviderTag>,
    by_tag: HashMap<ProviderTag, Arc<dyn ContentProvider>>,
}

#[derive(Default)]
pub struct ProviderRegistry {
    slots: OnceLock<Slots>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider. May only be called once.
    pub fn initialize(&self, providers: Vec<Arc<dyn ContentProvider>>) -> Result<(), RegistryError> {
        if self.slots.get().is_some() {
            return Err(RegistryError::AlreadyInitialized);
        }

        let mut order = Vec::with_capacity(providers.len());
        let mut by_tag = HashMap::with_capacity(providers.len());
        for provider in providers {
            let tag = provider.tag();
            if by_tag.insert(tag, provider).is_some() {
                return Err(RegistryError::DuplicateTag(tag));
            }
            order.push(tag);
        }

        self.slots
            .set(Slots { order, by_tag })
            .map_err(|_| RegistryError::AlreadyInitialized)?;

        info!(providers = ?self.tags(), "Provider registry initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.slots.get().is_some()
    }

    pub fn get(&self, tag: ProviderTag) -> Option<Arc<dyn ContentProvider>> {
        self.slots.get()?.by_tag.get(&tag).cloned()
    }

    /// Providers in registration order
    pub fn all(&self) -> Vec<Arc<dyn ContentProvider>> {
        match self.slots.get() {
            Some(slots) => slots
                .order
                .iter()
                .filter_map(|tag| slots.by_tag.get(tag).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn tags(&self) -> Vec<ProviderTag> {
        self.slots
            .get()
            .map(|slots| slots.order.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticProvider;

    #[test]
    fn test_lookup_by_tag() {
        let registry = ProviderRegistry::new();
        assert!(registry.get(ProviderTag::SuperflixApi).is_none());

        registry
            .initialize(vec![Arc::new(StaticProvider::new(ProviderTag::SuperflixApi))])
            .unwrap();

        assert!(registry.is_initialized());
        assert!(registry.get(ProviderTag::SuperflixApi).is_some());
        assert!(registry.get(ProviderTag::RedeCanais).is_none());
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = ProviderRegistry::new();
        registry
            .initialize(vec![
                Arc::new(StaticProvider::new(ProviderTag::RedeCanais)),
                Arc::new(StaticProvider::new(ProviderTag::SuperflixApi)),
            ])
            .unwrap();

        assert_eq!(
            registry.tags(),
            vec![ProviderTag::RedeCanais, ProviderTag::SuperflixApi]
        );
        let tags: Vec<_> = registry.all().iter().map(|p| p.tag()).collect();
        assert_eq!(tags, registry.tags());
    }

    #[test]
    fn test_second_initialization_rejected() {
        let registry = ProviderRegistry::new();
        registry.initialize(Vec::new()).unwrap();

        let err = registry
            .initialize(vec![Arc::new(StaticProvider::new(ProviderTag::SuperflixApi))])
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyInitialized);
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let registry = ProviderRegistry::new();
        let err = registry
            .initialize(vec![
                Arc::new(StaticProvider::new(ProviderTag::SuperflixApi)),
                Arc::new(StaticProvider::new(ProviderTag::SuperflixApi)),
            ])
            .unwrap_err();

        assert_eq!(err, RegistryError::DuplicateTag(ProviderTag::SuperflixApi));
        assert!(!registry.is_initialized());
    }
}
