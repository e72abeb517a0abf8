//! Constraint matcher (spec.md §4.3): narrows a request group's candidate
//! providers down to the ones satisfying every capability and resource
//! constraint, then picks one.
//!
//! Grounded on `original_source/claim.py`'s `MatchContext`,
//! `_process_capability_constraints` and `_process_resource_constraints`.
//! The Python module used two singleton sentinel objects, `NoMatches` and
//! `NoExclude`, compared by identity; here that's an enum so the compiler
//! enforces the three outcomes are handled (spec.md §9 re-architecture
//! hint).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::model::ProviderId;
use crate::query;
use crate::request::{CapabilityConstraint, ClaimRequestGroup};
use crate::store::{CandidateProvider, ClaimStore};
use crate::error::Result;

/// Outcome of evaluating one constraint against the catalog/store.
pub enum ConstraintMatchResult {
    /// Candidate providers were found.
    Matched(HashSet<ProviderId>),
    /// No provider satisfies the constraint; the group is infeasible.
    NoMatches,
    /// The constraint carried only negative (exclusion) filters and none of
    /// them excluded anything — a positive result that doesn't narrow the
    /// candidate set.
    NoExclude,
}

/// Accumulates the running intersection/union of matching providers and the
/// set to exclude, across a request group's constraints.
#[derive(Default)]
struct MatchContext {
    matches: Option<HashSet<ProviderId>>,
    excludes: HashSet<ProviderId>,
}

impl MatchContext {
    fn match_or(&mut self, new_matches: HashSet<ProviderId>) -> bool {
        self.matches = Some(match self.matches.take() {
            Some(existing) => existing.union(&new_matches).copied().collect(),
            None => new_matches,
        });
        !self.matches.as_ref().unwrap().is_empty()
    }

    fn match_and(&mut self, new_matches: HashSet<ProviderId>) -> bool {
        self.matches = Some(match self.matches.take() {
            Some(existing) => existing.intersection(&new_matches).copied().collect(),
            None => new_matches,
        });
        !self.matches.as_ref().unwrap().is_empty()
    }

    fn exclude_or(&mut self, new_exclude: HashSet<ProviderId>) {
        self.excludes.extend(new_exclude);
    }

    /// Drops any accumulated matches that a later `forbid` constraint
    /// excluded.
    fn apply_excludes(&mut self) {
        if let Some(matches) = self.matches.take() {
            let excludes = &self.excludes;
            self.matches = Some(matches.into_iter().filter(|p| !excludes.contains(p)).collect());
        }
    }
}

/// Evaluates one capability constraint's `require`/`any` positive clauses
/// against the catalog/store, returning `NoMatches` if either clause
/// matched zero providers (spec.md P4/require-all, P3's `any` counterpart).
async fn evaluate_positive_clauses(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    constraint: &CapabilityConstraint,
) -> Result<ConstraintMatchResult> {
    let mut positive: Option<HashSet<ProviderId>> = None;

    if !constraint.require.is_empty() {
        let ids = query::providers_with_all_caps(store, catalog, &constraint.require).await?;
        if ids.is_empty() {
            return Ok(ConstraintMatchResult::NoMatches);
        }
        let set: HashSet<ProviderId> = ids.into_iter().collect();
        positive = Some(match positive {
            Some(p) => p.intersection(&set).copied().collect(),
            None => set,
        });
    }

    if !constraint.any.is_empty() {
        let ids = query::providers_with_any_caps(store, catalog, &constraint.any).await?;
        if ids.is_empty() {
            return Ok(ConstraintMatchResult::NoMatches);
        }
        let set: HashSet<ProviderId> = ids.into_iter().collect();
        positive = Some(match positive {
            Some(p) => p.intersection(&set).copied().collect(),
            None => set,
        });
    }

    match positive {
        Some(set) if set.is_empty() => Ok(ConstraintMatchResult::NoMatches),
        Some(set) => Ok(ConstraintMatchResult::Matched(set)),
        None => Ok(ConstraintMatchResult::NoExclude),
    }
}

/// Narrows `ctx` to providers satisfying every capability constraint in
/// `group`. Returns `false` if the group is infeasible.
///
/// Positive (`require`/`any`) results from different capability constraints
/// are OR'd together (spec.md §4.3: "Between capability constraints in the
/// same group, results are OR'd"), not intersected — a group with
/// `require:[a]` and `require:[b]` matches providers carrying either `a` or
/// `b`, not both.
///
/// `forbid` clauses are handled separately from `require`/`any`: a forbid
/// clause that matches zero providers is a positive no-op (spec.md P6,
/// "null-forbid positivity") rather than a failure, and a forbid clause
/// that matches some providers excludes them rather than narrowing the
/// match set by intersection.
async fn process_capability_constraints(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    group: &ClaimRequestGroup,
    ctx: &mut MatchContext,
) -> Result<bool> {
    for constraint in &group.capabilities {
        match evaluate_positive_clauses(store, catalog, constraint).await? {
            ConstraintMatchResult::NoMatches => {
                info!(?constraint, "no matching providers for capability constraint");
                return Ok(false);
            }
            ConstraintMatchResult::NoExclude => {}
            ConstraintMatchResult::Matched(providers) => {
                if !ctx.match_or(providers) {
                    info!(?constraint, "capability constraint emptied candidate set");
                    return Ok(false);
                }
            }
        }

        if !constraint.forbid.is_empty() {
            let forbidden = query::providers_with_any_caps(store, catalog, &constraint.forbid).await?;
            if !forbidden.is_empty() {
                ctx.exclude_or(forbidden.into_iter().collect());
            }
            // else: a forbid clause matching nothing is a positive no-op
            // (P6) — it does not narrow `ctx.matches`.
        }
    }
    ctx.apply_excludes();
    Ok(true)
}

/// A resource constraint's embedded capability constraint is simple enough
/// (single `require` capability, no `forbid`/`any`) to push into the
/// capacity query itself via `with_capability`, mirroring the original's
/// "only one cap in require" fast path (`claim.py`'s
/// `_select_add_capability_constraint`). Anything more — multiple `require`
/// caps, `any`, or `forbid` — is resolved separately and applied as a
/// post-filter below.
fn single_require_capability(constraint: &CapabilityConstraint) -> Option<&str> {
    if constraint.forbid.is_empty() && constraint.any.is_empty() && constraint.require.len() == 1 {
        Some(constraint.require[0].as_str())
    } else {
        None
    }
}

/// Narrows `providers` to those also satisfying a resource-scoped capability
/// constraint (spec.md §4.2 Primitive A / §4.3: "a resource constraint may
/// embed its own capability constraint"). Returns `false` if the constraint
/// empties the set.
async fn apply_resource_capability_constraint(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    cap: &CapabilityConstraint,
    providers: &mut HashSet<ProviderId>,
) -> Result<bool> {
    match evaluate_positive_clauses(store, catalog, cap).await? {
        ConstraintMatchResult::NoMatches => return Ok(false),
        ConstraintMatchResult::Matched(allowed) => {
            *providers = providers.intersection(&allowed).copied().collect();
        }
        ConstraintMatchResult::NoExclude => {}
    }
    if !cap.forbid.is_empty() {
        let forbidden: HashSet<ProviderId> = query::providers_with_any_caps(store, catalog, &cap.forbid)
            .await?
            .into_iter()
            .collect();
        providers.retain(|p| !forbidden.contains(p));
    }
    Ok(!providers.is_empty())
}

/// Narrows `ctx` to providers with effective capacity for every resource
/// constraint in `group`, over the claim's `[acquire_time, release_time)`.
async fn process_resource_constraints(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    group: &ClaimRequestGroup,
    acquire_time: i64,
    release_time: i64,
    ctx: &mut MatchContext,
) -> Result<bool> {
    for constraint in &group.resources {
        let exclude: Vec<ProviderId> = ctx.excludes.iter().copied().collect();
        let simple_cap = constraint.capability.as_ref().and_then(single_require_capability);

        let candidates = query::providers_with_resource(
            store,
            catalog,
            &constraint.resource_type_code,
            constraint.amount,
            acquire_time,
            release_time,
            &exclude,
            simple_cap,
        )
        .await?;

        let mut providers: HashSet<ProviderId> = candidates.iter().map(|c| c.provider.id).collect();

        if let Some(cap) = &constraint.capability {
            if simple_cap.is_none()
                && !apply_resource_capability_constraint(store, catalog, cap, &mut providers).await?
            {
                info!(resource_type = %constraint.resource_type_code, "resource-scoped capability constraint emptied candidate set");
                return Ok(false);
            }
        }

        if !ctx.match_and(providers) {
            info!(resource_type = %constraint.resource_type_code, "no provider satisfies resource constraint");
            return Ok(false);
        }
        debug!(resource_type = %constraint.resource_type_code, count = candidates.len(), "candidates for resource constraint");
    }
    Ok(true)
}

/// The outcome of matching one request group: the single chosen provider,
/// plus the capacity data needed to build its allocation items.
pub struct GroupMatch {
    pub provider: CandidateProvider,
}

/// Evaluates capability constraints, then resource constraints, then picks
/// one provider from the surviving candidate set (spec.md §4.3/§4.4:
/// "processes capability constraints before resource constraints").
///
/// Returns `None` if the group is infeasible.
pub async fn match_group(
    store: &Arc<dyn ClaimStore>,
    catalog: &Catalog,
    group: &ClaimRequestGroup,
    acquire_time: i64,
    release_time: i64,
) -> Result<Option<GroupMatch>> {
    if !group.provider_groups.is_empty() || !group.distances.is_empty() {
        debug!(
            group = %group.name,
            "group carries provider-group/distance constraints that are not enforced by the matcher"
        );
    }

    let mut ctx = MatchContext::default();

    if !process_capability_constraints(store, catalog, group, &mut ctx).await? {
        return Ok(None);
    }
    if !process_resource_constraints(store, catalog, group, acquire_time, release_time, &mut ctx).await? {
        return Ok(None);
    }

    let Some(matches) = &ctx.matches else {
        // No resource constraints at all: nothing to pick.
        return Ok(None);
    };
    let Some(&chosen_id) = matches.iter().next() else {
        return Ok(None);
    };

    // Re-fetch full candidate data for the chosen provider against the
    // group's first resource constraint so the planner has an inventory
    // snapshot to work from (the executor re-validates for real at commit
    // time, per spec.md §4.5 Phase 1).
    let Some(first) = group.resources.first() else {
        return Ok(None);
    };
    let simple_cap = first.capability.as_ref().and_then(single_require_capability);
    let candidates = query::providers_with_resource(
        store,
        catalog,
        &first.resource_type_code,
        first.amount,
        acquire_time,
        release_time,
        &[],
        simple_cap,
    )
    .await?;
    let provider = candidates.into_iter().find(|c| c.provider.id == chosen_id);

    Ok(provider.map(|provider| GroupMatch { provider }))
}
