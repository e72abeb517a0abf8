//! Placement planner (spec.md §4.4): evaluates every request group and
//! assembles the allocation items a successful claim would write.
//!
//! Grounded on `original_source/claim.py`'s `process_claim_request` /
//! `_process_claim_request_group`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::model::AllocationItem;
use crate::request::ClaimRequest;
use crate::store::ClaimStore;

/// A plan ready for the executor: the flattened allocation items plus which
/// request group each item was produced for (spec.md §4.4's
/// `item_to_group_map`, used for diagnostics when Phase 1 re-validation
/// fails).
pub struct Plan {
    pub items: Vec<AllocationItem>,
    pub item_to_group: HashMap<usize, String>,
}

/// Evaluates every group in `request` in order. If any group is
/// infeasible, the whole claim is infeasible and `Ok(None)` is returned
/// (spec.md §4.4: "a claim succeeds only if every group succeeds").
pub async fn process_claim_request(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    request: &ClaimRequest,
) -> Result<Option<Plan>> {
    let mut items = Vec::new();
    let mut item_to_group = HashMap::new();

    for group in &request.groups {
        let matched = crate::matcher::match_group(
            store,
            catalog,
            group,
            request.acquire_time,
            request.release_time,
        )
        .await?;

        let Some(matched) = matched else {
            info!(group = %group.name, "request group is infeasible");
            return Ok(None);
        };

        for resource in &group.resources {
            let item = AllocationItem {
                provider_id: matched.provider.provider.id,
                provider_uuid: matched.provider.provider.uuid,
                resource_type_code: resource.resource_type_code.clone(),
                used: resource.amount,
            };
            item_to_group.insert(items.len(), group.name.clone());
            items.push(item);
        }
    }

    Ok(Some(Plan {
        items,
        item_to_group,
    }))
}
