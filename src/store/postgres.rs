//! Postgres-backed `ClaimStore` adapter (spec.md §4.2/§4.5).
//!
//! Built against `sqlx`'s runtime query API rather than the `query!`/
//! `query_as!` macros: those require either a live `DATABASE_URL` or an
//! offline query cache at build time, neither of which this crate can
//! assume. The SQL shapes below are ported from `original_source/claim.py`'s
//! `_find_providers_with_resource`, `_find_providers_with_all_caps`,
//! `_find_providers_with_any_caps` and `_check_provider_capacity`, with the
//! window predicate resolved to true overlap per spec.md §9.
//!
//! Expected schema (DDL owned by the deploying application, not this
//! crate — spec.md's Non-goals exclude schema migration):
//! `providers(id, uuid, generation, partition)`,
//! `provider_types(id, code)`, `consumer_types(id, code)`,
//! `resource_types(id, code)`, `capabilities(id, code)`,
//! `provider_capabilities(provider_id, capability_id)`,
//! `inventories(provider_id, resource_type_id, total, reserved, min_unit,
//! max_unit, step_size, allocation_ratio)`,
//! `consumers(id, uuid, owner_project, owner_user, generation)`,
//! `allocations(id, consumer_id, acquire_time, release_time)`,
//! `allocation_items(allocation_id, provider_id, resource_type_id, used)`.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{ClaimError, Result};
use crate::model::{
    AllocationItem, CapabilityId, ConsumerId, ConsumerTypeId, Inventory, Provider, ProviderId,
    ProviderTypeId, ResourceTypeId, UnitViolation,
};

use super::{CandidateProvider, ClaimStore};

/// `sqlx::PgPool`-backed `ClaimStore`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }
}

fn row_to_inventory(row: &sqlx::postgres::PgRow) -> Inventory {
    Inventory {
        total: row.get("total"),
        reserved: row.get("reserved"),
        min_unit: row.get("min_unit"),
        max_unit: row.get("max_unit"),
        step_size: row.get("step_size"),
        allocation_ratio: row.get("allocation_ratio"),
    }
}

fn row_to_provider(row: &sqlx::postgres::PgRow) -> Provider {
    Provider {
        id: ProviderId(row.get("id")),
        uuid: row.get("uuid"),
        generation: row.get("generation"),
        partition: row.get("partition"),
        groups: Vec::new(),
    }
}

#[async_trait]
impl ClaimStore for PostgresStore {
    async fn provider_type_id(&self, code: &str) -> Result<Option<ProviderTypeId>> {
        let row = sqlx::query("SELECT id FROM provider_types WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ProviderTypeId(r.get("id"))))
    }

    async fn consumer_type_id(&self, code: &str) -> Result<Option<ConsumerTypeId>> {
        let row = sqlx::query("SELECT id FROM consumer_types WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ConsumerTypeId(r.get("id"))))
    }

    async fn resource_type_id(&self, code: &str) -> Result<Option<ResourceTypeId>> {
        let row = sqlx::query("SELECT id FROM resource_types WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ResourceTypeId(r.get("id"))))
    }

    async fn capability_id(&self, code: &str) -> Result<Option<CapabilityId>> {
        let row = sqlx::query("SELECT id FROM capabilities WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| CapabilityId(r.get("id"))))
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
        // Used-in-window is computed with the true overlap predicate
        // (existing.acquire < new.release AND existing.release > new.acquire),
        // not the original's containment predicate (spec.md §9 REDESIGN FLAG).
        let exclude_ids: Vec<i64> = exclude.iter().map(|p| p.0).collect();
        let cap_id = with_capability.map(|c| c.0);

        let sql = "
            SELECT p.id, p.uuid, p.generation, p.partition,
                   i.total, i.reserved, i.min_unit, i.max_unit, i.step_size,
                   i.allocation_ratio,
                   COALESCE(u.used, 0) AS used
            FROM providers p
            JOIN inventories i ON i.provider_id = p.id AND i.resource_type_id = $1
            LEFT JOIN (
                SELECT ai.provider_id, SUM(ai.used) AS used
                FROM allocation_items ai
                JOIN allocations a ON a.id = ai.allocation_id
                WHERE ai.resource_type_id = $1
                  AND a.acquire_time < $3
                  AND a.release_time > $2
                GROUP BY ai.provider_id
            ) u ON u.provider_id = p.id
            WHERE ($4::bigint[] IS NULL OR p.id != ALL($4))
              AND ($5::bigint IS NULL OR EXISTS (
                    SELECT 1 FROM provider_capabilities pc
                    WHERE pc.provider_id = p.id AND pc.capability_id = $5
                  ))
              AND i.min_unit <= $6 AND $6 <= i.max_unit
              AND $6 % i.step_size = 0
              AND (i.total - i.reserved) * i.allocation_ratio >= $6 + COALESCE(u.used, 0)
        ";

        let rows = sqlx::query(sql)
            .bind(resource_type.0)
            .bind(acquire_time)
            .bind(release_time)
            .bind(&exclude_ids)
            .bind(cap_id)
            .bind(amount)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| CandidateProvider {
                provider: row_to_provider(row),
                inventory: row_to_inventory(row),
                used: row.get("used"),
            })
            .collect())
    }

    async fn find_providers_with_all_caps(
        &self,
        capabilities: &[CapabilityId],
    ) -> Result<Vec<ProviderId>> {
        if capabilities.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = capabilities.iter().map(|c| c.0).collect();
        let rows = sqlx::query(
            "SELECT provider_id FROM provider_capabilities
             WHERE capability_id = ANY($1)
             GROUP BY provider_id
             HAVING COUNT(DISTINCT capability_id) = $2",
        )
        .bind(&ids)
        .bind(ids.len() as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| ProviderId(r.get("provider_id"))).collect())
    }

    async fn find_providers_with_any_caps(
        &self,
        capabilities: &[CapabilityId],
    ) -> Result<Vec<ProviderId>> {
        if capabilities.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = capabilities.iter().map(|c| c.0).collect();
        let rows = sqlx::query(
            "SELECT DISTINCT provider_id FROM provider_capabilities
             WHERE capability_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| ProviderId(r.get("provider_id"))).collect())
    }

    async fn check_provider_capacity(
        &self,
        provider: ProviderId,
        resource_type: ResourceTypeId,
        amount: i64,
        acquire_time: i64,
        release_time: i64,
    ) -> Result<i64> {
        let provider_row = sqlx::query("SELECT id, uuid, generation, partition FROM providers WHERE id = $1")
            .bind(provider.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ClaimError::MissingInventory {
                provider: Uuid::nil(),
                resource_code: format!("{resource_type}"),
            })?;
        let provider_uuid: Uuid = provider_row.get("uuid");
        let generation: i64 = provider_row.get("generation");

        let inv_row = sqlx::query(
            "SELECT total, reserved, min_unit, max_unit, step_size, allocation_ratio
             FROM inventories WHERE provider_id = $1 AND resource_type_id = $2",
        )
        .bind(provider.0)
        .bind(resource_type.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ClaimError::MissingInventory {
            provider: provider_uuid,
            resource_code: format!("{resource_type}"),
        })?;
        let inventory = row_to_inventory(&inv_row);

        if let Err(violation) = inventory.satisfies_unit_discipline(amount) {
            return Err(match violation {
                UnitViolation::Min(bound) => ClaimError::MinUnitViolation {
                    provider: provider_uuid,
                    resource_code: format!("{resource_type}"),
                    bound,
                    requested: amount,
                },
                UnitViolation::Max(bound) => ClaimError::MaxUnitViolation {
                    provider: provider_uuid,
                    resource_code: format!("{resource_type}"),
                    bound,
                    requested: amount,
                },
                UnitViolation::Step(bound) => ClaimError::StepSizeViolation {
                    provider: provider_uuid,
                    resource_code: format!("{resource_type}"),
                    bound,
                    requested: amount,
                },
            });
        }

        let used_row = sqlx::query(
            "SELECT COALESCE(SUM(ai.used), 0) AS used
             FROM allocation_items ai
             JOIN allocations a ON a.id = ai.allocation_id
             WHERE ai.provider_id = $1 AND ai.resource_type_id = $2
               AND a.acquire_time < $4 AND a.release_time > $3",
        )
        .bind(provider.0)
        .bind(resource_type.0)
        .bind(acquire_time)
        .bind(release_time)
        .fetch_one(&self.pool)
        .await?;
        let used: i64 = used_row.get("used");

        if inventory.effective_capacity() < (amount + used) as f64 {
            return Err(ClaimError::CapacityExceeded {
                provider: provider_uuid,
                resource_code: format!("{resource_type}"),
                requested: amount,
                total: inventory.total,
                total_used: used,
                reserved: inventory.reserved,
                allocation_ratio: inventory.allocation_ratio,
            });
        }
        Ok(generation)
    }

    async fn consumer_id_or_create(
        &self,
        consumer_uuid: Uuid,
        owner_project: Uuid,
        owner_user: Uuid,
    ) -> Result<ConsumerId> {
        let mut tx = self.pool.begin().await?;

        if let Some(row) = sqlx::query("SELECT id FROM consumers WHERE uuid = $1")
            .bind(consumer_uuid)
            .fetch_optional(&mut *tx)
            .await?
        {
            tx.commit().await?;
            return Ok(ConsumerId(row.get("id")));
        }

        let row = sqlx::query(
            "INSERT INTO consumers (uuid, owner_project, owner_user, generation)
             VALUES ($1, $2, $3, 1)
             RETURNING id",
        )
        .bind(consumer_uuid)
        .bind(owner_project)
        .bind(owner_user)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(ConsumerId(row.get("id")))
    }

    async fn commit_allocation(
        &self,
        consumer_id: ConsumerId,
        acquire_time: i64,
        release_time: i64,
        items: &[AllocationItem],
        expected_generations: &HashMap<ProviderId, i64>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let allocation_row = sqlx::query(
            "INSERT INTO allocations (consumer_id, acquire_time, release_time)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(consumer_id.0)
        .bind(acquire_time)
        .bind(release_time)
        .fetch_one(&mut *tx)
        .await?;
        let allocation_id: i64 = allocation_row.get("id");

        for item in items {
            let resource_type_id = sqlx::query("SELECT id FROM resource_types WHERE code = $1")
                .bind(&item.resource_type_code)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get::<i64, _>("id"))
                .ok_or_else(|| ClaimError::UnknownCode(item.resource_type_code.clone()))?;

            sqlx::query(
                "INSERT INTO allocation_items (allocation_id, provider_id, resource_type_id, used)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(allocation_id)
            .bind(item.provider_id.0)
            .bind(resource_type_id)
            .bind(item.used)
            .execute(&mut *tx)
            .await?;

            // Compare-and-swap against the generation Phase 1 observed, not
            // a value re-read here: CASing against a value just read inside
            // this same transaction would always match and the check would
            // never fire. A zero row count means some other commit touched
            // this provider after Phase 1 validated it (spec.md §4.5/§9).
            let expected_generation =
                expected_generations
                    .get(&item.provider_id)
                    .copied()
                    .ok_or_else(|| ClaimError::MissingInventory {
                        provider: item.provider_uuid,
                        resource_code: item.resource_type_code.clone(),
                    })?;

            let updated = sqlx::query(
                "UPDATE providers SET generation = generation + 1
                 WHERE id = $1 AND generation = $2",
            )
            .bind(item.provider_id.0)
            .bind(expected_generation)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(ClaimError::GenerationConflict {
                    object_type: "provider",
                    object_uuid: item.provider_uuid,
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
