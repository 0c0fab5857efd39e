//! Credit ledger RPCs

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use adforge_ledger::{ActorType, DebitOutcome, LedgerEventBuilder, LedgerEventType};

use crate::{error::ApiResult, state::AppState};

/// Request for the credit check RPC
#[derive(Debug, Deserialize)]
pub struct CheckCreditsRequest {
    pub account_id: Uuid,
    pub required_credits: i64,
}

/// Response for the credit check RPC
#[derive(Debug, Serialize)]
pub struct CheckCreditsResponse {
    pub has_credits: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Advisory pre-flight check. The gate re-checks atomically at debit time;
/// this endpoint exists for UI affordances, not enforcement.
pub async fn check_credits(
    State(state): State<AppState>,
    Json(req): Json<CheckCreditsRequest>,
) -> ApiResult<Json<CheckCreditsResponse>> {
    let check = state
        .ledger
        .gate
        .check(req.account_id, req.required_credits)
        .await?;

    let error_message = if check.has_credits {
        None
    } else {
        Some(format!(
            "Insufficient credits: {} required, {} available",
            req.required_credits, check.balance
        ))
    };

    Ok(Json(CheckCreditsResponse {
        has_credits: check.has_credits,
        error_message,
    }))
}

/// Request for the debit/grant RPCs
#[derive(Debug, Deserialize)]
pub struct MutateCreditsRequest {
    pub account_id: Uuid,
    pub amount: i64,
}

/// Response for the debit/grant RPCs
#[derive(Debug, Serialize)]
pub struct MutateCreditsResponse {
    pub success: bool,
    pub current_credits: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Debit credits from an account. Denials report in-band with the current
/// balance and a human-readable reason.
pub async fn debit_credits(
    State(state): State<AppState>,
    Json(req): Json<MutateCreditsRequest>,
) -> ApiResult<Json<MutateCreditsResponse>> {
    let outcome = state
        .ledger
        .store
        .debit_if_available(req.account_id, req.amount, None)
        .await?;

    let response = match outcome {
        DebitOutcome::Debited { new_balance, .. } => MutateCreditsResponse {
            success: true,
            current_credits: new_balance,
            error_message: None,
        },
        DebitOutcome::Denied { balance, reason } => MutateCreditsResponse {
            success: false,
            current_credits: balance,
            error_message: Some(reason),
        },
    };

    Ok(Json(response))
}

/// Grant credits to an account (operator/manual grants; webhook grants flow
/// through the reconciler instead).
pub async fn grant_credits(
    State(state): State<AppState>,
    Json(req): Json<MutateCreditsRequest>,
) -> ApiResult<Json<MutateCreditsResponse>> {
    let receipt = state
        .ledger
        .store
        .grant_credits(req.account_id, req.amount, None, None)
        .await?;

    state
        .ledger
        .audit
        .try_log(
            LedgerEventBuilder::new(req.account_id, LedgerEventType::CreditsGranted)
                .data(serde_json::json!({
                    "credits": req.amount,
                    "new_balance": receipt.new_balance,
                    "source": "manual",
                }))
                .operation(receipt.operation_id)
                .actor_type(ActorType::Admin),
        )
        .await;

    Ok(Json(MutateCreditsResponse {
        success: true,
        current_credits: receipt.new_balance,
        error_message: None,
    }))
}

/// Balance response
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: Uuid,
    pub credit_balance: i64,
}

/// Get the current balance for an account
pub async fn get_balance(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.ledger.store.balance(account_id).await?;

    Ok(Json(BalanceResponse {
        account_id,
        credit_balance: balance,
    }))
}

/// Query params for the history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Operation history entry for API responses
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub id: Uuid,
    pub kind: String,
    pub amount: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub created_at: String,
}

/// Get recent credit operations for an account, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<OperationResponse>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let operations = state.ledger.store.operations(account_id, limit).await?;

    let responses = operations
        .into_iter()
        .map(|op| OperationResponse {
            id: op.id,
            kind: op.kind.to_string(),
            amount: op.amount,
            status: format!("{:?}", op.status).to_lowercase(),
            error_message: op.error_message,
            external_event_id: op.external_event_id,
            request_id: op.request_id,
            created_at: op
                .created_at
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        })
        .collect();

    Ok(Json(responses))
}
