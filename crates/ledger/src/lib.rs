//! AdForge Credit Ledger
//!
//! Billing-driven resource accounting: durable credit balances, exactly-once
//! webhook grants, atomic debit gating for paid actions, and an append-only
//! audit trail. All cross-request coordination happens through the store's
//! transactional primitives; nothing in this crate caches a balance in
//! process memory.

pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod plans;
pub mod store;
pub mod webhook;

use sqlx::PgPool;

pub use audit::{ActorType, LedgerEvent, LedgerEventBuilder, LedgerEventLogger, LedgerEventType};
pub use config::PaymentConfig;
pub use error::{LedgerError, LedgerResult};
pub use gate::{Authorization, CreditCheck, CreditGate, GateDecision, RefundOutcome};
pub use plans::{Plan, PlanService};
pub use store::{CreditOperation, DebitOutcome, GrantReceipt, LedgerStore, OperationKind, OperationStatus};
pub use webhook::{ReconcileOutcome, WebhookEvent, WebhookReconciler};

/// Aggregated ledger services, one per concern
#[derive(Clone)]
pub struct LedgerService {
    pub store: LedgerStore,
    pub plans: PlanService,
    pub gate: CreditGate,
    pub webhooks: WebhookReconciler,
    pub audit: LedgerEventLogger,
}

impl LedgerService {
    pub fn new(config: PaymentConfig, pool: PgPool) -> Self {
        Self {
            store: LedgerStore::new(pool.clone()),
            plans: PlanService::new(pool.clone()),
            gate: CreditGate::new(pool.clone()),
            webhooks: WebhookReconciler::new(config, pool.clone()),
            audit: LedgerEventLogger::new(pool),
        }
    }
}
