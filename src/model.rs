//! Core entities of the claim engine's data model (spec.md §3).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a newtype wrapping the compact integer id a catalog/store table
/// uses internally, so ids from different tables can't be mixed up at
/// compile time (teacher's `EntityId<T>` phantom-type idiom, simplified
/// since these wrap plain `i64`s rather than `Uuid`s).
macro_rules! int_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

int_id!(ProviderId);
int_id!(ProviderTypeId);
int_id!(ResourceTypeId);
int_id!(CapabilityId);
int_id!(ConsumerTypeId);
int_id!(ConsumerId);
int_id!(AllocationId);

/// A claim's acquire/release window, in epoch seconds.
///
/// Window overlap is decided with the true overlap predicate
/// (`existing.acquire < self.release AND existing.release > self.acquire`),
/// resolving the containment-vs-overlap ambiguity noted in spec.md §9 in
/// favor of true overlap, per the REDESIGN FLAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub acquire_time: i64,
    pub release_time: i64,
}

impl TimeWindow {
    pub fn new(acquire_time: i64, release_time: i64) -> Self {
        Self {
            acquire_time,
            release_time,
        }
    }

    /// True iff `other` overlaps `self` under the true-overlap predicate.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        other.acquire_time < self.release_time && other.release_time > self.acquire_time
    }
}

/// A provider of quantified resources (spec.md §3, `Provider`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub uuid: Uuid,
    pub generation: i64,
    pub partition: Option<String>,
    pub groups: Vec<Uuid>,
}

/// Kind of a provider group, inferred from its hyphen-delimited name
/// structure (`site`, `site-rowN`, `site-rowN-rackM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderGroupKind {
    Site,
    Row,
    Rack,
}

/// A named grouping of providers (spec.md §3, `ProviderGroup`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderGroup {
    pub uuid: Uuid,
    pub name: String,
}

impl ProviderGroup {
    /// Splits the hyphen-delimited name into `(site, row, rack)` parts,
    /// mirroring `original_source/models.py`'s `ProviderGroup.name_parts`.
    pub fn name_parts(&self) -> (String, Option<String>, Option<String>) {
        let parts: Vec<&str> = self.name.split('-').collect();
        match parts.as_slice() {
            [site] => ((*site).to_string(), None, None),
            [site, row] => (
                (*site).to_string(),
                row.strip_prefix("row").map(str::to_string),
                None,
            ),
            [site, row, rack, ..] => (
                (*site).to_string(),
                row.strip_prefix("row").map(str::to_string),
                rack.strip_prefix("rack").map(str::to_string),
            ),
            [] => (String::new(), None, None),
        }
    }

    pub fn kind(&self) -> ProviderGroupKind {
        match self.name.split('-').count() {
            1 => ProviderGroupKind::Site,
            2 => ProviderGroupKind::Row,
            _ => ProviderGroupKind::Rack,
        }
    }
}

/// A resource type known to the catalog (e.g. `"VCPU"`, `"DISK_GB"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceType {
    pub id: ResourceTypeId,
    pub code: String,
}

/// A capability code known to the catalog (e.g. `"HW_GPU_NVIDIA"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: CapabilityId,
    pub code: String,
}

/// Per-(provider, resource type) capacity record (spec.md §3, `Inventory`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub total: i64,
    pub reserved: i64,
    pub min_unit: i64,
    pub max_unit: i64,
    pub step_size: i64,
    pub allocation_ratio: f64,
}

impl Inventory {
    /// Effective capacity: `(total - reserved) * allocation_ratio`.
    pub fn effective_capacity(&self) -> f64 {
        (self.total - self.reserved) as f64 * self.allocation_ratio
    }

    /// I2: unit discipline — `min_unit <= amount <= max_unit` and
    /// `amount % step_size == 0`.
    pub fn satisfies_unit_discipline(&self, amount: i64) -> Result<(), UnitViolation> {
        if amount < self.min_unit {
            return Err(UnitViolation::Min(self.min_unit));
        }
        if amount > self.max_unit {
            return Err(UnitViolation::Max(self.max_unit));
        }
        if amount % self.step_size != 0 {
            return Err(UnitViolation::Step(self.step_size));
        }
        Ok(())
    }
}

/// Which bound of I2 was violated, and by what value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitViolation {
    Min(i64),
    Max(i64),
    Step(i64),
}

/// A consumer of resources, created lazily on first claim
/// (spec.md §3, `Consumer`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    pub id: Option<ConsumerId>,
    pub uuid: Uuid,
    pub owner_project: Uuid,
    pub owner_user: Uuid,
    pub generation: i64,
}

impl Consumer {
    /// A new, not-yet-persisted consumer (`id` is filled in by the executor
    /// on first claim; generation starts at 1 per spec.md §9 and is never
    /// CAS-updated thereafter).
    pub fn new(owner_project: Uuid, owner_user: Uuid) -> Self {
        Self {
            id: None,
            uuid: Uuid::now_v7(),
            owner_project,
            owner_user,
            generation: 1,
        }
    }
}

/// The persisted header for a committed set of allocation items
/// (spec.md §3, `Allocation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Option<AllocationId>,
    pub consumer_id: ConsumerId,
    pub window: TimeWindow,
}

/// A single resource commitment against one provider
/// (spec.md §3, `AllocationItem`). Borrows the provider's identity by
/// `(id, uuid)` pair — never a back-reference to the provider record
/// (spec.md §9, "cycle-free ownership").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationItem {
    pub provider_id: ProviderId,
    pub provider_uuid: Uuid,
    pub resource_type_code: String,
    pub used: i64,
}
