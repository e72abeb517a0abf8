//! The `ClaimStore` port (spec.md §4.7) and its adapters.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    AllocationItem, CapabilityId, ConsumerId, ConsumerTypeId, Inventory, Provider, ProviderId,
    ProviderTypeId, ResourceTypeId,
};

/// A candidate provider returned by query primitive A, carrying the
/// inventory row the matcher needs to re-check unit discipline.
#[derive(Debug, Clone)]
pub struct CandidateProvider {
    pub provider: Provider,
    pub inventory: Inventory,
    pub used: i64,
}

/// Abstraction over the relational store backing the catalog, query and
/// executor layers, so the executor's Phase 1/Phase 2 logic is adapter
/// agnostic (spec.md §4.7).
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Catalog lookup: provider type code -> id (spec.md §4.1).
    async fn provider_type_id(&self, code: &str) -> Result<Option<ProviderTypeId>>;

    /// Catalog lookup: consumer type code -> id (spec.md §4.1).
    async fn consumer_type_id(&self, code: &str) -> Result<Option<ConsumerTypeId>>;

    /// Catalog lookup: resource type code -> id (spec.md §4.1).
    async fn resource_type_id(&self, code: &str) -> Result<Option<ResourceTypeId>>;

    /// Catalog lookup: capability code -> id (spec.md §4.1).
    async fn capability_id(&self, code: &str) -> Result<Option<CapabilityId>>;

    /// Query primitive A (spec.md §4.2): providers with enough effective
    /// capacity of `resource_type` for `amount` over `[acquire, release)`,
    /// honoring unit discipline, excluding `exclude` ids, optionally
    /// requiring `with_capability`.
    async fn find_providers_with_resource(
        &self,
        resource_type: ResourceTypeId,
        amount: i64,
        acquire_time: i64,
        release_time: i64,
        exclude: &[ProviderId],
        with_capability: Option<CapabilityId>,
    ) -> Result<Vec<CandidateProvider>>;

    /// Query primitive B (spec.md §4.2): providers carrying every listed
    /// capability.
    async fn find_providers_with_all_caps(
        &self,
        capabilities: &[CapabilityId],
    ) -> Result<Vec<ProviderId>>;

    /// Query primitive C (spec.md §4.2): providers carrying any listed
    /// capability.
    async fn find_providers_with_any_caps(
        &self,
        capabilities: &[CapabilityId],
    ) -> Result<Vec<ProviderId>>;

    /// Re-reads one provider's generation, inventory and in-window usage,
    /// for the executor's Phase 1 re-validation (spec.md §4.5). Returns the
    /// generation observed, which the executor must carry unchanged into
    /// `commit_allocation`'s CAS — re-reading a fresh generation inside the
    /// commit transaction would make the compare-and-swap trivially pass
    /// against itself.
    async fn check_provider_capacity(
        &self,
        provider: ProviderId,
        resource_type: ResourceTypeId,
        amount: i64,
        acquire_time: i64,
        release_time: i64,
    ) -> Result<i64>;

    /// Looks up a consumer by external uuid, creating it if absent
    /// (spec.md §4.5, `original_source/consumer.py`'s
    /// `create_if_not_exists`).
    async fn consumer_id_or_create(
        &self,
        consumer_uuid: Uuid,
        owner_project: Uuid,
        owner_user: Uuid,
    ) -> Result<ConsumerId>;

    /// Phase 2 (spec.md §4.5): persists the allocation header and items,
    /// and compare-and-swaps each touched provider's generation against the
    /// value recorded in `expected_generations` during Phase 1 — not a
    /// value re-read inside this call. Must be atomic: either every write
    /// lands, or none does.
    async fn commit_allocation(
        &self,
        consumer_id: ConsumerId,
        acquire_time: i64,
        release_time: i64,
        items: &[AllocationItem],
        expected_generations: &HashMap<ProviderId, i64>,
    ) -> Result<()>;
}
