//! Webhook Reconciler
//!
//! Translates payment-provider events into exactly-once credit grants.
//!
//! The provider delivers events at-least-once; the reconciler makes the
//! effect at-most-once by anchoring every grant on the external event id
//! (existence check + partial unique index in the same transaction as the
//! grant). The handler performs no internal retry loop: any failure is
//! returned to the provider, whose redelivery is safe to replay.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{ActorType, LedgerEventBuilder, LedgerEventLogger, LedgerEventType};
use crate::config::PaymentConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::plans::PlanService;
use crate::store::LedgerStore;

type HmacSha256 = Hmac<Sha256>;

/// Provider event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// External event id; the idempotency key
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

/// Payload wrapper inside the envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

/// What reconciling an event did
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// Credits were granted for this event
    Granted {
        account_id: Uuid,
        plan_name: String,
        credits: i64,
        new_balance: i64,
    },
    /// A successful grant for this event id already exists; no-op
    AlreadyProcessed,
    /// Event type carries no grant; acknowledged and skipped
    Ignored,
}

/// Service consuming payment-provider webhook deliveries
#[derive(Clone)]
pub struct WebhookReconciler {
    config: PaymentConfig,
    pool: PgPool,
    store: LedgerStore,
    plans: PlanService,
    audit: LedgerEventLogger,
}

impl WebhookReconciler {
    pub fn new(config: PaymentConfig, pool: PgPool) -> Self {
        Self {
            config,
            store: LedgerStore::new(pool.clone()),
            plans: PlanService::new(pool.clone()),
            audit: LedgerEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Verify a delivery's signature header and parse the event envelope.
    ///
    /// No ledger access happens before this check passes.
    pub fn verify_event(&self, payload: &str, signature_header: &str) -> LedgerResult<WebhookEvent> {
        verify_signature(
            &self.config.webhook_secret,
            self.config.signature_tolerance_secs,
            payload,
            signature_header,
            OffsetDateTime::now_utc().unix_timestamp(),
        )?;

        serde_json::from_str(payload)
            .map_err(|e| LedgerError::MalformedEvent(format!("invalid event envelope: {}", e)))
    }

    /// Apply a verified event to the ledger
    pub async fn handle_event(&self, event: WebhookEvent) -> LedgerResult<ReconcileOutcome> {
        match event.event_type.as_str() {
            "checkout.session.completed" | "invoice.paid" => self.reconcile_grant(&event).await,
            other => {
                // Acknowledge so the provider does not redeliver events this
                // subsystem never consumes
                tracing::debug!(
                    event_id = %event.id,
                    event_type = %other,
                    "Webhook event type not handled, skipping"
                );
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }

    async fn reconcile_grant(&self, event: &WebhookEvent) -> LedgerResult<ReconcileOutcome> {
        let object = &event.data.object;

        let price_id = extract_price_id(&event.event_type, object).ok_or_else(|| {
            LedgerError::PriceResolution(format!(
                "event {} ({}) carries no price line item",
                event.id, event.event_type
            ))
        })?;

        let plan = self
            .plans
            .plan_for_price_id(&price_id)
            .await?
            .ok_or_else(|| LedgerError::UnknownPlan(price_id.clone()))?;

        let account_id = self.resolve_account(object).await?;

        // Existence check; the partial unique index closes the race between
        // concurrent duplicate deliveries
        if self.store.has_grant_for_event(&event.id).await? {
            tracing::info!(
                event_id = %event.id,
                account_id = %account_id,
                "Webhook event already granted, treating redelivery as no-op"
            );
            self.audit
                .try_log(
                    LedgerEventBuilder::new(account_id, LedgerEventType::WebhookDuplicate)
                        .external_event(&event.id)
                        .actor_type(ActorType::PaymentProvider),
                )
                .await;
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let receipt = match self
            .store
            .grant_credits(account_id, plan.credits_granted, Some(&event.id), None)
            .await
        {
            Ok(receipt) => receipt,
            Err(LedgerError::DuplicateEvent(_)) => {
                // Lost a race against a concurrent duplicate delivery
                return Ok(ReconcileOutcome::AlreadyProcessed);
            }
            Err(e) => return Err(e),
        };

        self.audit
            .try_log(
                LedgerEventBuilder::new(account_id, LedgerEventType::CreditsGranted)
                    .data(serde_json::json!({
                        "plan": plan.name.clone(),
                        "external_price_id": price_id.clone(),
                        "credits": plan.credits_granted,
                        "new_balance": receipt.new_balance,
                    }))
                    .external_event(&event.id)
                    .operation(receipt.operation_id)
                    .actor_type(ActorType::PaymentProvider),
            )
            .await;

        tracing::info!(
            event_id = %event.id,
            account_id = %account_id,
            plan = %plan.name,
            credits = plan.credits_granted,
            new_balance = receipt.new_balance,
            "Webhook grant applied"
        );

        Ok(ReconcileOutcome::Granted {
            account_id,
            plan_name: plan.name,
            credits: plan.credits_granted,
            new_balance: receipt.new_balance,
        })
    }

    /// Resolve the ledger account an event belongs to: embedded account id
    /// first, provider customer id as fallback
    async fn resolve_account(&self, object: &Value) -> LedgerResult<Uuid> {
        if let Some(account_id) = embedded_account_id(object) {
            return Ok(account_id);
        }

        if let Some(customer) = object.get("customer").and_then(Value::as_str) {
            let row: Option<(Uuid,)> =
                sqlx::query_as("SELECT id FROM accounts WHERE external_customer_id = $1")
                    .bind(customer)
                    .fetch_optional(&self.pool)
                    .await?;

            if let Some((account_id,)) = row {
                return Ok(account_id);
            }
            return Err(LedgerError::UnknownAccount(format!(
                "no account for customer {}",
                customer
            )));
        }

        Err(LedgerError::UnknownAccount(
            "event carries neither an account reference nor a customer id".to_string(),
        ))
    }
}

/// Account id embedded directly in the event payload, if any
fn embedded_account_id(object: &Value) -> Option<Uuid> {
    object
        .get("client_reference_id")
        .and_then(Value::as_str)
        .or_else(|| object.pointer("/metadata/account_id").and_then(Value::as_str))
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Pull the external price id out of the event payload.
///
/// Checkout sessions carry their prices under `line_items.data`, invoices
/// (subscription renewals) under `lines.data`.
fn extract_price_id(event_type: &str, object: &Value) -> Option<String> {
    let items = match event_type {
        "checkout.session.completed" => object.pointer("/line_items/data"),
        "invoice.paid" => object.pointer("/lines/data"),
        _ => None,
    }?;

    items.as_array()?.iter().find_map(|item| {
        item.pointer("/price/id")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

/// Verify a `t=<unix_ts>,v1=<hex hmac-sha256>` signature header over
/// `"{timestamp}.{payload}"`.
fn verify_signature(
    secret: &str,
    tolerance_secs: i64,
    payload: &str,
    signature_header: &str,
    now_unix: i64,
) -> LedgerResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut provided_sig: Option<&str> = None;

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => provided_sig = Some(value),
            _ => {}
        }
    }

    let (Some(timestamp), Some(provided_sig)) = (timestamp, provided_sig) else {
        return Err(LedgerError::InvalidSignature);
    };

    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(LedgerError::InvalidSignature);
    }

    let provided = hex::decode(provided_sig).map_err(|_| LedgerError::InvalidSignature)?;

    #[allow(clippy::expect_used)] // HMAC accepts keys of any size; this cannot fail
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());

    mac.verify_slice(&provided)
        .map_err(|_| LedgerError::InvalidSignature)
}
