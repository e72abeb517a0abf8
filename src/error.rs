//! Error types for the claim engine

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for claim engine operations
pub type Result<T> = std::result::Result<T, ClaimError>;

/// Main error type for the claim engine
#[derive(Error, Debug)]
pub enum ClaimError {
    /// A catalog code string could not be resolved to an internal id
    #[error("unknown code: {0}")]
    UnknownCode(String),

    /// Phase-1 re-validation found that an inventory row disappeared
    /// between planning and execution
    #[error("provider {provider} has no inventory for resource {resource_code}")]
    MissingInventory {
        provider: Uuid,
        resource_code: String,
    },

    /// Requested amount was below the provider's minimum unit
    #[error(
        "min unit violation for provider {provider}, resource {resource_code}: \
         requested {requested} is less than min_unit {bound}"
    )]
    MinUnitViolation {
        provider: Uuid,
        resource_code: String,
        bound: i64,
        requested: i64,
    },

    /// Requested amount exceeded the provider's maximum unit
    #[error(
        "max unit violation for provider {provider}, resource {resource_code}: \
         requested {requested} is greater than max_unit {bound}"
    )]
    MaxUnitViolation {
        provider: Uuid,
        resource_code: String,
        bound: i64,
        requested: i64,
    },

    /// Requested amount was not aligned to the provider's step size
    #[error(
        "step size violation for provider {provider}, resource {resource_code}: \
         requested {requested} is not a multiple of step_size {bound}"
    )]
    StepSizeViolation {
        provider: Uuid,
        resource_code: String,
        bound: i64,
        requested: i64,
    },

    /// Phase-1 re-validation found insufficient effective capacity
    #[error(
        "capacity exceeded for provider {provider}, resource {resource_code}: \
         requested {requested}, total {total}, used {total_used}, \
         reserved {reserved}, allocation_ratio {allocation_ratio}"
    )]
    CapacityExceeded {
        provider: Uuid,
        resource_code: String,
        requested: i64,
        total: i64,
        total_used: i64,
        reserved: i64,
        allocation_ratio: f64,
    },

    /// Phase-2 generation compare-and-swap failed: another claim committed
    /// against the same object first
    #[error("generation conflict on {object_type} {object_uuid}")]
    GenerationConflict {
        object_type: &'static str,
        object_uuid: Uuid,
    },

    /// Underlying store error not covered by a typed variant above
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A YAML loader (provider profile / deployment / claim config)
    /// could not be parsed
    #[error("config error: {0}")]
    Config(String),
}
