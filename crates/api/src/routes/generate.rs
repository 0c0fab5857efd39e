//! Gated generation endpoint

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adforge_generation::{AdVariant, BusinessContext};

use crate::{error::ApiResult, state::AppState};

/// Request to generate ad variants
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub account_id: Uuid,
    pub prompt: String,
    pub business_context: BusinessContext,
}

/// Response for a completed generation
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub request_id: Uuid,
    pub variants: Vec<AdVariant>,
    /// Sizes that failed under the accept-partial policy; empty on full success
    pub failed_sizes: Vec<String>,
    pub attempts_used: u32,
    pub credits_charged: i64,
}

/// Run one credit-gated generation request
pub async fn create_generation(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let outcome = state
        .orchestrator
        .generate(req.account_id, &req.prompt, req.business_context)
        .await?;

    if !outcome.failed_sizes.is_empty() {
        tracing::warn!(
            account_id = %req.account_id,
            request_id = %outcome.request_id,
            failed_sizes = ?outcome.failed_sizes,
            "Generation completed with partial resize coverage"
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            request_id: outcome.request_id,
            variants: outcome.variants,
            failed_sizes: outcome.failed_sizes,
            attempts_used: outcome.attempts_used,
            credits_charged: outcome.credits_charged,
        }),
    ))
}
