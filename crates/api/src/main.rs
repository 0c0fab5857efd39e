//! AdForge API server binary

use std::sync::Arc;

use anyhow::Context;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adforge_api::{routes, AppState, Config};
use adforge_generation::{
    GenerationOrchestrator, HttpGenerationProvider, HttpResizeProvider, OrchestratorConfig, Resizer,
};
use adforge_ledger::{CreditGate, LedgerService, PaymentConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "adforge_api=info,adforge_ledger=info,adforge_generation=info,tower_http=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let payment_config = PaymentConfig::from_env().context("loading payment configuration")?;

    // Migrations run on a dedicated single-connection pool
    let migration_pool = adforge_shared::db::create_migration_pool(&config.database_url)
        .await
        .context("connecting for migrations")?;
    adforge_shared::db::run_migrations(&migration_pool)
        .await
        .context("running migrations")?;
    migration_pool.close().await;

    let pool = adforge_shared::db::create_pool(&config.database_url)
        .await
        .context("connecting to database")?;

    let ledger = LedgerService::new(payment_config, pool.clone());

    let http_client = reqwest::Client::new();
    let generation_provider = Arc::new(HttpGenerationProvider::new(
        http_client.clone(),
        config.generation_provider_url.clone(),
        config.generation_api_key.clone(),
    ));
    let resize_provider = Arc::new(HttpResizeProvider::new(
        http_client,
        config.resize_provider_url.clone(),
        config.resize_api_key.clone(),
    ));

    let orchestrator = GenerationOrchestrator::new(
        CreditGate::new(pool.clone()),
        generation_provider,
        Resizer::new(resize_provider, config.partial_resize_policy),
        OrchestratorConfig {
            max_attempts: config.generation_max_attempts,
            attempt_timeout: config.generation_attempt_timeout,
            credits_per_generation: config.credits_per_generation,
        },
    );

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config, ledger, orchestrator);

    let app = routes::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {}", bind_address))?;

    tracing::info!(address = %bind_address, "AdForge API listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
