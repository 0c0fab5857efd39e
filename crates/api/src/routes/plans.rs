//! Plan catalog endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::ApiResult, state::AppState};

/// Plan entry for API responses
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: Uuid,
    pub name: String,
    pub external_price_id: String,
    pub credits_granted: i64,
}

/// List active plans, cheapest grant first
pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<PlanResponse>>> {
    let plans = state.ledger.plans.list_active().await?;

    let responses = plans
        .into_iter()
        .map(|plan| PlanResponse {
            id: plan.id,
            name: plan.name,
            external_price_id: plan.external_price_id,
            credits_granted: plan.credits_granted,
        })
        .collect();

    Ok(Json(responses))
}
