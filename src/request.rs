//! External claim request schema (spec.md §6).
//!
//! These types mirror `original_source/claim.py`'s `ResourceConstraint`,
//! `CapabilityConstraint`, `ProviderGroupConstraint`, `DistanceConstraint`,
//! `ClaimRequestGroupOptions`, `ClaimRequestGroup` and `ClaimRequest` classes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requires a provider to supply at least `amount` of `resource_type_code`.
///
/// `capability` is an optional constraint scoped to this resource alone
/// (`original_source/claim_config.py:72-77`'s per-resource `capabilities`
/// key, `claim.py:624-626`'s `resource_constraint.capability_constraint`),
/// distinct from a group's own `capabilities` list: it narrows which
/// providers count toward *this* resource's capacity query rather than the
/// group's candidate set as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConstraint {
    pub resource_type_code: String,
    pub amount: i64,
    #[serde(default)]
    pub capability: Option<CapabilityConstraint>,
}

/// A capability constraint on the providers matching a request group, in
/// one of three forms (`original_source/claim_config.py`'s `require`/
/// `forbid`/`any` keys):
///
/// - `require`: matching providers must carry every listed capability.
/// - `forbid`: matching providers must carry none of the listed
///   capabilities.
/// - `any`: matching providers must carry at least one listed capability.
///
/// At most one of the three is expected to be set per constraint; if more
/// than one is set they are applied independently (require narrows, forbid
/// excludes, any narrows), which is also how the original treated a block
/// carrying more than one key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConstraint {
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub forbid: Vec<String>,
    #[serde(default)]
    pub any: Vec<String>,
}

/// Kind of a distance constraint's domain, per `deployment_config.py`'s
/// site/row/rack hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceDomain {
    Network,
    Failure,
}

/// Accepted by the request schema and the deployment-config loader; not
/// enforced by the matcher (see DESIGN.md "Open Question decisions").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceConstraint {
    pub domain: DistanceDomain,
    pub min_distance: u32,
}

/// Restricts candidate providers to members of one `ProviderGroup`.
/// Accepted and parsed; not enforced by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGroupConstraint {
    pub group_uuid: Uuid,
}

/// Group-wide placement options. Parsed, currently inert (see
/// DESIGN.md "Open Question decisions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClaimRequestGroupOptions {
    #[serde(default)]
    pub single_provider: bool,
    #[serde(default)]
    pub isolate_from: bool,
}

/// One group of constraints within a claim request. A claim is satisfiable
/// only if every group in the request can be placed (spec.md §4.3/§4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequestGroup {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ResourceConstraint>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityConstraint>,
    #[serde(default)]
    pub provider_groups: Vec<ProviderGroupConstraint>,
    #[serde(default)]
    pub distances: Vec<DistanceConstraint>,
    #[serde(default)]
    pub options: ClaimRequestGroupOptions,
}

/// Top-level input to `planner::process_claim_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub consumer_uuid: Uuid,
    pub owner_project: Uuid,
    pub owner_user: Uuid,
    pub acquire_time: i64,
    pub release_time: i64,
    pub groups: Vec<ClaimRequestGroup>,
}
