//! API routes

pub mod credits;
pub mod generate;
pub mod health;
pub mod plans;
pub mod webhooks;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Payment webhook (public, uses signature verification)
    let webhook_routes = Router::new().route("/webhooks/payment", post(webhooks::payment_webhook));

    // Credit and generation RPCs - under /api/v1
    let api_v1_routes = Router::new()
        .route("/credits/check", post(credits::check_credits))
        .route("/credits/debit", post(credits::debit_credits))
        .route("/credits/grant", post(credits::grant_credits))
        .route("/credits/balance/:account_id", get(credits::get_balance))
        .route("/credits/history/:account_id", get(credits::get_history))
        .route("/plans", get(plans::list_plans))
        .route("/generations", post(generate::create_generation));

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .nest("/api/v1", api_v1_routes)
        // Global request body size limit to prevent oversized payloads
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}
