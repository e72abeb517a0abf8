//! Query primitives A/B/C (spec.md §4.2), thin wrappers over `ClaimStore`
//! that resolve request-level codes through the `Catalog` first.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::model::ProviderId;
use crate::store::{CandidateProvider, ClaimStore};

/// Query primitive A: providers with enough effective capacity of
/// `resource_type_code` for `amount` over `[acquire_time, release_time)`.
pub async fn providers_with_resource(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    resource_type_code: &str,
    amount: i64,
    acquire_time: i64,
    release_time: i64,
    exclude: &[ProviderId],
    with_capability_code: Option<&str>,
) -> Result<Vec<CandidateProvider>> {
    let resource_type = catalog.resource_type_id(resource_type_code).await?;
    let with_capability = match with_capability_code {
        Some(code) => Some(catalog.capability_id(code).await?),
        None => None,
    };
    store
        .find_providers_with_resource(
            resource_type,
            amount,
            acquire_time,
            release_time,
            exclude,
            with_capability,
        )
        .await
}

/// Query primitive B: providers carrying every one of `capability_codes`.
pub async fn providers_with_all_caps(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    capability_codes: &[String],
) -> Result<Vec<ProviderId>> {
    let ids = catalog.capability_ids(capability_codes).await?;
    store.find_providers_with_all_caps(&ids).await
}

/// Query primitive C: providers carrying any one of `capability_codes`.
pub async fn providers_with_any_caps(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    capability_codes: &[String],
) -> Result<Vec<ProviderId>> {
    let ids = catalog.capability_ids(capability_codes).await?;
    store.find_providers_with_any_caps(&ids).await
}
