//! Claim executor (spec.md §4.5): re-validates the planner's proposed
//! allocation items against current state (Phase 1), then writes them
//! atomically (Phase 2).
//!
//! Grounded on `original_source/claim.py`'s `_check_provider_capacity` and
//! `execute`, and `original_source/consumer.py`'s `create_if_not_exists`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::model::{Allocation, ConsumerId, ProviderId, TimeWindow};
use crate::planner::Plan;
use crate::request::ClaimRequest;
use crate::store::ClaimStore;

/// What a successful claim produced: the consumer it was recorded against
/// and the allocation header (spec.md §3, §4.5).
pub struct Claim {
    pub consumer_id: ConsumerId,
    pub allocation: Allocation,
}

/// Phase 1: re-reads every plan item's provider generation, inventory and
/// in-window usage, returning the first violation found (spec.md §4.5,
/// "Phase 1: validate"). Returns the generation observed for each touched
/// provider, which Phase 2 must CAS against unchanged — re-reading a fresh
/// generation inside the commit transaction would make the
/// compare-and-swap pass against itself and silently defeat it (spec.md
/// §4.5/§9).
async fn validate(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    plan: &Plan,
    acquire_time: i64,
    release_time: i64,
) -> Result<HashMap<ProviderId, i64>> {
    let mut expected_generations = HashMap::new();
    for item in &plan.items {
        let resource_type = catalog.resource_type_id(&item.resource_type_code).await?;
        let generation = store
            .check_provider_capacity(
                item.provider_id,
                resource_type,
                item.used,
                acquire_time,
                release_time,
            )
            .await?;
        expected_generations.insert(item.provider_id, generation);
    }
    Ok(expected_generations)
}

/// Runs Phase 1 re-validation then Phase 2 commit for one claim request's
/// plan. On success, the consumer is created if it didn't already exist
/// (spec.md §4.5) and every touched provider's generation is bumped.
pub async fn execute(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    request: &ClaimRequest,
    plan: Plan,
) -> Result<Claim> {
    let expected_generations =
        validate(store, catalog, &plan, request.acquire_time, request.release_time).await?;

    let consumer_id = store
        .consumer_id_or_create(request.consumer_uuid, request.owner_project, request.owner_user)
        .await?;

    store
        .commit_allocation(
            consumer_id,
            request.acquire_time,
            request.release_time,
            &plan.items,
            &expected_generations,
        )
        .await?;

    info!(
        consumer_uuid = %request.consumer_uuid,
        items = plan.items.len(),
        "claim committed"
    );

    Ok(Claim {
        consumer_id,
        allocation: Allocation {
            id: None,
            consumer_id,
            window: TimeWindow::new(request.acquire_time, request.release_time),
        },
    })
}

/// Runs the planner then the executor end to end, mirroring
/// `original_source/run.py`'s `find_claims` driving `claim.process_claim_request`
/// followed by `claim.execute`. Returns `Ok(None)` if the request is
/// infeasible (no error — infeasibility is a normal outcome per spec.md §4.4).
pub async fn process_and_execute(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    request: &ClaimRequest,
) -> Result<Option<Claim>> {
    let Some(plan) = crate::planner::process_claim_request(store, catalog, request).await? else {
        return Ok(None);
    };
    let claim = execute(store, catalog, request, plan).await?;
    Ok(Some(claim))
}
