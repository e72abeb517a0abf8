//! In-process `ClaimStore` adapter (spec.md §4.7 / ambient stack).
//!
//! Grounded on the teacher's `adapters::in_memory::InMemoryStorageAdapter`:
//! plain `HashMap`s behind `RwLock`s, no persistence across process
//! restarts. Used by the property/scenario test suite and by the CLI's
//! `--reset` fixture loader, neither of which can assume a live Postgres.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ClaimError, Result};
use crate::model::{
    AllocationItem, CapabilityId, Consumer, ConsumerId, ConsumerTypeId, Inventory, Provider,
    ProviderId, ProviderTypeId, ResourceTypeId, TimeWindow,
};

use super::{CandidateProvider, ClaimStore};

#[derive(Debug, Clone)]
struct AllocationRecord {
    provider_id: ProviderId,
    resource_type_id: ResourceTypeId,
    amount: i64,
    window: TimeWindow,
}

struct Inner {
    resource_types: HashMap<String, ResourceTypeId>,
    capabilities: HashMap<String, CapabilityId>,
    provider_types: HashMap<String, ProviderTypeId>,
    consumer_types: HashMap<String, ConsumerTypeId>,
    providers: HashMap<ProviderId, Provider>,
    provider_capabilities: HashMap<ProviderId, HashSet<CapabilityId>>,
    inventories: HashMap<(ProviderId, ResourceTypeId), Inventory>,
    consumers_by_uuid: HashMap<Uuid, ConsumerId>,
    consumers: HashMap<ConsumerId, Consumer>,
    allocations: Vec<AllocationRecord>,
}

/// `Arc<RwLock<HashMap>>`-backed `ClaimStore`, fully self-contained — no
/// external database required.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    next_resource_type_id: AtomicI64,
    next_capability_id: AtomicI64,
    next_consumer_id: AtomicI64,
    next_provider_type_id: AtomicI64,
    next_consumer_type_id: AtomicI64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                resource_types: HashMap::new(),
                capabilities: HashMap::new(),
                provider_types: HashMap::new(),
                consumer_types: HashMap::new(),
                providers: HashMap::new(),
                provider_capabilities: HashMap::new(),
                inventories: HashMap::new(),
                consumers_by_uuid: HashMap::new(),
                consumers: HashMap::new(),
                allocations: Vec::new(),
            }),
            next_resource_type_id: AtomicI64::new(1),
            next_capability_id: AtomicI64::new(1),
            next_consumer_id: AtomicI64::new(1),
            next_provider_type_id: AtomicI64::new(1),
            next_consumer_type_id: AtomicI64::new(1),
        }
    }

    /// Registers a resource type code, returning its id (creating one if
    /// the code is new). Used by fixture loaders.
    pub async fn ensure_resource_type(&self, code: &str) -> ResourceTypeId {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.resource_types.get(code) {
            return *id;
        }
        let id = ResourceTypeId(self.next_resource_type_id.fetch_add(1, Ordering::SeqCst));
        inner.resource_types.insert(code.to_string(), id);
        id
    }

    /// Registers a capability code, returning its id. Used by fixture
    /// loaders.
    pub async fn ensure_capability(&self, code: &str) -> CapabilityId {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.capabilities.get(code) {
            return *id;
        }
        let id = CapabilityId(self.next_capability_id.fetch_add(1, Ordering::SeqCst));
        inner.capabilities.insert(code.to_string(), id);
        id
    }

    /// Registers a provider type code, returning its id. Used by fixture
    /// loaders.
    pub async fn ensure_provider_type(&self, code: &str) -> ProviderTypeId {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.provider_types.get(code) {
            return *id;
        }
        let id = ProviderTypeId(self.next_provider_type_id.fetch_add(1, Ordering::SeqCst));
        inner.provider_types.insert(code.to_string(), id);
        id
    }

    /// Registers a consumer type code, returning its id. Used by fixture
    /// loaders.
    pub async fn ensure_consumer_type(&self, code: &str) -> ConsumerTypeId {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.consumer_types.get(code) {
            return *id;
        }
        let id = ConsumerTypeId(self.next_consumer_type_id.fetch_add(1, Ordering::SeqCst));
        inner.consumer_types.insert(code.to_string(), id);
        id
    }

    /// Inserts or replaces a provider record. Used by fixture loaders.
    pub async fn put_provider(&self, provider: Provider) {
        let mut inner = self.inner.write().await;
        inner.providers.insert(provider.id, provider);
    }

    /// Grants a provider a capability. Used by fixture loaders.
    pub async fn grant_capability(&self, provider_id: ProviderId, capability: CapabilityId) {
        let mut inner = self.inner.write().await;
        inner
            .provider_capabilities
            .entry(provider_id)
            .or_default()
            .insert(capability);
    }

    /// Sets a provider's inventory row for one resource type. Used by
    /// fixture loaders.
    pub async fn put_inventory(
        &self,
        provider_id: ProviderId,
        resource_type: ResourceTypeId,
        inventory: Inventory,
    ) {
        let mut inner = self.inner.write().await;
        inner.inventories.insert((provider_id, resource_type), inventory);
    }

    fn used_in_window(inner: &Inner, provider_id: ProviderId, resource_type: ResourceTypeId, window: &TimeWindow) -> i64 {
        inner
            .allocations
            .iter()
            .filter(|a| a.provider_id == provider_id && a.resource_type_id == resource_type)
            .filter(|a| window.overlaps(&a.window))
            .map(|a| a.amount)
            .sum()
    }
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn provider_type_id(&self, code: &str) -> Result<Option<ProviderTypeId>> {
        Ok(self.inner.read().await.provider_types.get(code).copied())
    }

    async fn consumer_type_id(&self, code: &str) -> Result<Option<ConsumerTypeId>> {
        Ok(self.inner.read().await.consumer_types.get(code).copied())
    }

    async fn resource_type_id(&self, code: &str) -> Result<Option<ResourceTypeId>> {
        Ok(self.inner.read().await.resource_types.get(code).copied())
    }

    async fn capability_id(&self, code: &str) -> Result<Option<CapabilityId>> {
        Ok(self.inner.read().await.capabilities.get(code).copied())
    }

    async fn find_providers_with_resource(
        &self,
        resource_type: ResourceTypeId,
        amount: i64,
        acquire_time: i64,
        release_time: i64,
        exclude: &[ProviderId],
        with_capability: Option<CapabilityId>,
    ) -> Result<Vec<CandidateProvider>> {
        let inner = self.inner.read().await;
        let window = TimeWindow::new(acquire_time, release_time);
        let mut out = Vec::new();

        for (provider_id, provider) in inner.providers.iter() {
            if exclude.contains(provider_id) {
                continue;
            }
            if let Some(cap) = with_capability {
                let has = inner
                    .provider_capabilities
                    .get(provider_id)
                    .map(|caps| caps.contains(&cap))
                    .unwrap_or(false);
                if !has {
                    continue;
                }
            }
            let Some(inventory) = inner.inventories.get(&(*provider_id, resource_type)) else {
                continue;
            };
            if inventory.satisfies_unit_discipline(amount).is_err() {
                continue;
            }
            let used = Self::used_in_window(&inner, *provider_id, resource_type, &window);
            if inventory.effective_capacity() >= (amount + used) as f64 {
                out.push(CandidateProvider {
                    provider: provider.clone(),
                    inventory: *inventory,
                    used,
                });
            }
        }
        Ok(out)
    }

    async fn find_providers_with_all_caps(
        &self,
        capabilities: &[CapabilityId],
    ) -> Result<Vec<ProviderId>> {
        let inner = self.inner.read().await;
        let wanted: HashSet<CapabilityId> = capabilities.iter().copied().collect();
        Ok(inner
            .provider_capabilities
            .iter()
            .filter(|(_, caps)| wanted.is_subset(caps))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn find_providers_with_any_caps(
        &self,
        capabilities: &[CapabilityId],
    ) -> Result<Vec<ProviderId>> {
        let inner = self.inner.read().await;
        let wanted: HashSet<CapabilityId> = capabilities.iter().copied().collect();
        Ok(inner
            .provider_capabilities
            .iter()
            .filter(|(_, caps)| !caps.is_disjoint(&wanted))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn check_provider_capacity(
        &self,
        provider: ProviderId,
        resource_type: ResourceTypeId,
        amount: i64,
        acquire_time: i64,
        release_time: i64,
    ) -> Result<i64> {
        let inner = self.inner.read().await;
        let provider_row = inner
            .providers
            .get(&provider)
            .ok_or_else(|| ClaimError::MissingInventory {
                provider: Uuid::nil(),
                resource_code: format!("{resource_type}"),
            })?;
        let inventory = inner
            .inventories
            .get(&(provider, resource_type))
            .ok_or_else(|| ClaimError::MissingInventory {
                provider: provider_row.uuid,
                resource_code: format!("{resource_type}"),
            })?;

        if let Err(violation) = inventory.satisfies_unit_discipline(amount) {
            return Err(match violation {
                crate::model::UnitViolation::Min(bound) => ClaimError::MinUnitViolation {
                    provider: provider_row.uuid,
                    resource_code: format!("{resource_type}"),
                    bound,
                    requested: amount,
                },
                crate::model::UnitViolation::Max(bound) => ClaimError::MaxUnitViolation {
                    provider: provider_row.uuid,
                    resource_code: format!("{resource_type}"),
                    bound,
                    requested: amount,
                },
                crate::model::UnitViolation::Step(bound) => ClaimError::StepSizeViolation {
                    provider: provider_row.uuid,
                    resource_code: format!("{resource_type}"),
                    bound,
                    requested: amount,
                },
            });
        }

        let window = TimeWindow::new(acquire_time, release_time);
        let used = Self::used_in_window(&inner, provider, resource_type, &window);
        if inventory.effective_capacity() < (amount + used) as f64 {
            return Err(ClaimError::CapacityExceeded {
                provider: provider_row.uuid,
                resource_code: format!("{resource_type}"),
                requested: amount,
                total: inventory.total,
                total_used: used,
                reserved: inventory.reserved,
                allocation_ratio: inventory.allocation_ratio,
            });
        }
        Ok(provider_row.generation)
    }

    async fn consumer_id_or_create(
        &self,
        consumer_uuid: Uuid,
        owner_project: Uuid,
        owner_user: Uuid,
    ) -> Result<ConsumerId> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.consumers_by_uuid.get(&consumer_uuid) {
            return Ok(*id);
        }
        let id = ConsumerId(self.next_consumer_id.fetch_add(1, Ordering::SeqCst));
        let consumer = Consumer {
            id: Some(id),
            uuid: consumer_uuid,
            owner_project,
            owner_user,
            generation: 1,
        };
        debug!(%consumer_uuid, "creating consumer");
        inner.consumers_by_uuid.insert(consumer_uuid, id);
        inner.consumers.insert(id, consumer);
        Ok(id)
    }

    async fn commit_allocation(
        &self,
        consumer_id: ConsumerId,
        acquire_time: i64,
        release_time: i64,
        items: &[AllocationItem],
        expected_generations: &HashMap<ProviderId, i64>,
    ) -> Result<()> {
        // The whole validate-then-write sequence runs under one write-lock
        // acquisition, so it plays the same role as the Postgres adapter's
        // per-provider generation CAS inside its commit transaction: two
        // concurrent commits against the same provider can never both see
        // the pre-commit capacity as available (spec.md §4.5/§5, P1/P7).
        // The generation check below is enforced anyway, so a caller's
        // Phase-1 snapshot is honored even though the lock alone already
        // rules out interleaving.
        let mut inner = self.inner.write().await;
        let window = TimeWindow::new(acquire_time, release_time);

        let mut resource_type_ids = Vec::with_capacity(items.len());
        for item in items {
            let resource_type_id = inner
                .resource_types
                .get(&item.resource_type_code)
                .copied()
                .ok_or_else(|| ClaimError::UnknownCode(item.resource_type_code.clone()))?;

            let provider_row = inner.providers.get(&item.provider_id).cloned().ok_or_else(|| {
                ClaimError::MissingInventory {
                    provider: Uuid::nil(),
                    resource_code: item.resource_type_code.clone(),
                }
            })?;
            if let Some(&expected) = expected_generations.get(&item.provider_id) {
                if provider_row.generation != expected {
                    return Err(ClaimError::GenerationConflict {
                        object_type: "provider",
                        object_uuid: provider_row.uuid,
                    });
                }
            }
            let inventory = inner
                .inventories
                .get(&(item.provider_id, resource_type_id))
                .copied()
                .ok_or_else(|| ClaimError::MissingInventory {
                    provider: provider_row.uuid,
                    resource_code: item.resource_type_code.clone(),
                })?;
            let used = Self::used_in_window(&inner, item.provider_id, resource_type_id, &window);
            if inventory.effective_capacity() < (item.used + used) as f64 {
                return Err(ClaimError::CapacityExceeded {
                    provider: provider_row.uuid,
                    resource_code: item.resource_type_code.clone(),
                    requested: item.used,
                    total: inventory.total,
                    total_used: used,
                    reserved: inventory.reserved,
                    allocation_ratio: inventory.allocation_ratio,
                });
            }
            resource_type_ids.push(resource_type_id);
        }

        for (item, resource_type_id) in items.iter().zip(resource_type_ids) {
            inner.allocations.push(AllocationRecord {
                provider_id: item.provider_id,
                resource_type_id,
                amount: item.used,
                window,
            });
            if let Some(provider) = inner.providers.get_mut(&item.provider_id) {
                provider.generation += 1;
            }
        }

        let _ = consumer_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_capacity_beyond_effective_total() {
        let store = InMemoryStore::new();
        let resource = store.ensure_resource_type("VCPU").await;
        let provider = Provider {
            id: ProviderId(1),
            uuid: Uuid::now_v7(),
            generation: 1,
            partition: None,
            groups: vec![],
        };
        store.put_provider(provider.clone()).await;
        store
            .put_inventory(
                provider.id,
                resource,
                Inventory {
                    total: 4,
                    reserved: 0,
                    min_unit: 1,
                    max_unit: 4,
                    step_size: 1,
                    allocation_ratio: 1.0,
                },
            )
            .await;

        let candidates = store
            .find_providers_with_resource(resource, 8, 0, 100, &[], None)
            .await
            .unwrap();
        assert!(candidates.is_empty());

        let candidates = store
            .find_providers_with_resource(resource, 4, 0, 100, &[], None)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn commit_rejects_a_stale_expected_generation() {
        let store = InMemoryStore::new();
        let resource = store.ensure_resource_type("VCPU").await;
        let provider = Provider {
            id: ProviderId(1),
            uuid: Uuid::now_v7(),
            generation: 1,
            partition: None,
            groups: vec![],
        };
        store.put_provider(provider.clone()).await;
        store
            .put_inventory(
                provider.id,
                resource,
                Inventory {
                    total: 4,
                    reserved: 0,
                    min_unit: 1,
                    max_unit: 4,
                    step_size: 1,
                    allocation_ratio: 1.0,
                },
            )
            .await;

        let item = AllocationItem {
            provider_id: provider.id,
            provider_uuid: provider.uuid,
            resource_type_code: "VCPU".to_string(),
            used: 1,
        };
        let mut stale = HashMap::new();
        stale.insert(provider.id, provider.generation + 1);

        let result = store
            .commit_allocation(ConsumerId(1), 0, 100, &[item], &stale)
            .await;
        assert!(matches!(result, Err(ClaimError::GenerationConflict { .. })));
    }
}
