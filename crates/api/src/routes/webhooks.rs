//! Payment webhook endpoint

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use adforge_ledger::{LedgerError, ReconcileOutcome};

use crate::state::AppState;

/// Signature header set by the payment provider
const SIGNATURE_HEADER: &str = "adforge-signature";

/// Handle payment provider webhook events.
///
/// Returns 200 `{"received": true}` on success, including idempotent no-ops
/// for redelivered events. Any non-200 response prompts the provider to
/// redeliver later; idempotency makes that safe.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    tracing::info!(body_len = body.len(), "Payment webhook received");

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Payment webhook missing signature header");
        return webhook_error(StatusCode::BAD_REQUEST, "Missing signature header");
    };

    // Verify and parse; no ledger access happens before this passes
    let event = match state.ledger.webhooks.verify_event(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Payment webhook rejected before processing");
            return webhook_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Payment webhook event verified"
    );

    match state.ledger.webhooks.handle_event(event).await {
        Ok(outcome) => {
            if let ReconcileOutcome::Granted {
                account_id,
                credits,
                ..
            } = &outcome
            {
                tracing::info!(
                    account_id = %account_id,
                    credits = credits,
                    "Payment webhook granted credits"
                );
            }
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Payment webhook handling failed");
            let status = match &e {
                LedgerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::PriceResolution(_)
                | LedgerError::UnknownPlan(_)
                | LedgerError::UnknownAccount(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_REQUEST,
            };
            webhook_error(status, &e.to_string())
        }
    }
}

fn webhook_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error": message,
            "type": "webhook_processing_error",
        })),
    )
        .into_response()
}
