//! Process-wide catalog lookups (spec.md §4.1).
//!
//! Resource-type and capability codes arrive in requests as strings but are
//! stored internally as compact integer ids. `Catalog` resolves codes to ids
//! once per process and caches the result, mirroring `original_source/
//! lookup.py`'s lazily-populated module-level maps but as an explicit,
//! one-shot-guarded container instead of globals.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use crate::error::{ClaimError, Result};
use crate::model::{CapabilityId, ConsumerTypeId, ProviderTypeId, ResourceTypeId};
use crate::store::ClaimStore;

/// Caches the four catalog lookups spec.md §4.1 names: provider type,
/// consumer type, resource type, and capability codes.
pub struct Catalog {
    store: Arc<dyn ClaimStore>,
    resource_types: OnceCell<RwLock<HashMap<String, ResourceTypeId>>>,
    capabilities: OnceCell<RwLock<HashMap<String, CapabilityId>>>,
    provider_types: OnceCell<RwLock<HashMap<String, ProviderTypeId>>>,
    consumer_types: OnceCell<RwLock<HashMap<String, ConsumerTypeId>>>,
}

impl Catalog {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self {
            store,
            resource_types: OnceCell::new(),
            capabilities: OnceCell::new(),
            provider_types: OnceCell::new(),
            consumer_types: OnceCell::new(),
        }
    }

    async fn resource_types(&self) -> &RwLock<HashMap<String, ResourceTypeId>> {
        self.resource_types
            .get_or_init(|| async {
                debug!("populating resource type catalog cache");
                RwLock::new(HashMap::new())
            })
            .await
    }

    async fn capabilities(&self) -> &RwLock<HashMap<String, CapabilityId>> {
        self.capabilities
            .get_or_init(|| async {
                debug!("populating capability catalog cache");
                RwLock::new(HashMap::new())
            })
            .await
    }

    /// Resolves a resource type code to its internal id, querying the store
    /// and caching on first lookup (spec.md §4.1).
    pub async fn resource_type_id(&self, code: &str) -> Result<ResourceTypeId> {
        let cache = self.resource_types().await;
        if let Some(id) = cache.read().await.get(code) {
            return Ok(*id);
        }
        let id = self
            .store
            .resource_type_id(code)
            .await?
            .ok_or_else(|| ClaimError::UnknownCode(code.to_string()))?;
        cache.write().await.insert(code.to_string(), id);
        Ok(id)
    }

    /// Resolves a capability code to its internal id, querying the store
    /// and caching on first lookup (spec.md §4.1).
    pub async fn capability_id(&self, code: &str) -> Result<CapabilityId> {
        let cache = self.capabilities().await;
        if let Some(id) = cache.read().await.get(code) {
            return Ok(*id);
        }
        let id = self
            .store
            .capability_id(code)
            .await?
            .ok_or_else(|| ClaimError::UnknownCode(code.to_string()))?;
        cache.write().await.insert(code.to_string(), id);
        Ok(id)
    }

    /// Resolves a batch of capability codes, failing on the first unknown
    /// code (matcher callers need all-or-nothing resolution).
    pub async fn capability_ids(&self, codes: &[String]) -> Result<Vec<CapabilityId>> {
        let mut ids = Vec::with_capacity(codes.len());
        for code in codes {
            ids.push(self.capability_id(code).await?);
        }
        Ok(ids)
    }

    async fn provider_types(&self) -> &RwLock<HashMap<String, ProviderTypeId>> {
        self.provider_types
            .get_or_init(|| async {
                debug!("populating provider type catalog cache");
                RwLock::new(HashMap::new())
            })
            .await
    }

    async fn consumer_types(&self) -> &RwLock<HashMap<String, ConsumerTypeId>> {
        self.consumer_types
            .get_or_init(|| async {
                debug!("populating consumer type catalog cache");
                RwLock::new(HashMap::new())
            })
            .await
    }

    /// Resolves a provider type code to its internal id, querying the store
    /// and caching on first lookup (spec.md §4.1).
    pub async fn provider_type_id(&self, code: &str) -> Result<ProviderTypeId> {
        let cache = self.provider_types().await;
        if let Some(id) = cache.read().await.get(code) {
            return Ok(*id);
        }
        let id = self
            .store
            .provider_type_id(code)
            .await?
            .ok_or_else(|| ClaimError::UnknownCode(code.to_string()))?;
        cache.write().await.insert(code.to_string(), id);
        Ok(id)
    }

    /// Resolves a consumer type code to its internal id, querying the store
    /// and caching on first lookup (spec.md §4.1).
    pub async fn consumer_type_id(&self, code: &str) -> Result<ConsumerTypeId> {
        let cache = self.consumer_types().await;
        if let Some(id) = cache.read().await.get(code) {
            return Ok(*id);
        }
        let id = self
            .store
            .consumer_type_id(code)
            .await?
            .ok_or_else(|| ClaimError::UnknownCode(code.to_string()))?;
        cache.write().await.insert(code.to_string(), id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn resolves_all_four_catalog_lookups() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_resource_type("VCPU").await;
        store.ensure_capability("HW_GPU_NVIDIA").await;
        store.ensure_provider_type("bare_metal").await;
        store.ensure_consumer_type("vm").await;

        let catalog = Catalog::new(store.clone() as Arc<dyn ClaimStore>);
        assert!(catalog.resource_type_id("VCPU").await.is_ok());
        assert!(catalog.capability_id("HW_GPU_NVIDIA").await.is_ok());
        assert!(catalog.provider_type_id("bare_metal").await.is_ok());
        assert!(catalog.consumer_type_id("vm").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_code_is_an_error_for_every_lookup() {
        let store = Arc::new(InMemoryStore::new());
        let catalog = Catalog::new(store as Arc<dyn ClaimStore>);
        assert!(matches!(
            catalog.provider_type_id("nonexistent").await,
            Err(ClaimError::UnknownCode(_))
        ));
        assert!(matches!(
            catalog.consumer_type_id("nonexistent").await,
            Err(ClaimError::UnknownCode(_))
        ));
    }
}
