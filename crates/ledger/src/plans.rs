//! Plan catalog
//!
//! Maps external billing price identifiers to credit grant amounts. Plans are
//! read-only from the ledger's perspective; operators manage them directly.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::LedgerResult;

/// A purchasable plan
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    /// Price identifier in the payment provider's catalog
    pub external_price_id: String,
    pub credits_granted: i64,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

/// Read-side service over the plan catalog
#[derive(Clone)]
pub struct PlanService {
    pool: PgPool,
}

impl PlanService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up the plan for an external price id (active plans only)
    pub async fn plan_for_price_id(&self, external_price_id: &str) -> LedgerResult<Option<Plan>> {
        let plan: Option<Plan> = sqlx::query_as(
            r#"
            SELECT id, name, external_price_id, credits_granted, active, created_at
            FROM plans
            WHERE external_price_id = $1 AND active = TRUE
            "#,
        )
        .bind(external_price_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    /// All active plans, cheapest grant first
    pub async fn list_active(&self) -> LedgerResult<Vec<Plan>> {
        let plans: Vec<Plan> = sqlx::query_as(
            r#"
            SELECT id, name, external_price_id, credits_granted, active, created_at
            FROM plans
            WHERE active = TRUE
            ORDER BY credits_granted ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }
}
