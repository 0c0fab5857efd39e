//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use adforge_generation::GenerationOrchestrator;
use adforge_ledger::LedgerService;

use crate::config::Config;

/// State shared by all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub ledger: Arc<LedgerService>,
    pub orchestrator: Arc<GenerationOrchestrator>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: Config,
        ledger: LedgerService,
        orchestrator: GenerationOrchestrator,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
