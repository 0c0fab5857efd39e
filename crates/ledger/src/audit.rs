//! Operation audit log
//!
//! Append-only audit trail for every credit mutation, used for reconciliation
//! and debugging. Writes are best-effort: a failed audit insert must never
//! roll back or fail the ledger mutation it describes, so callers log the
//! error and move on (or use [`LedgerEventLogger::try_log`]).

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::LedgerResult;

/// Types of ledger audit events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEventType {
    CreditsGranted,
    CreditsDebited,
    DebitDenied,
    RefundIssued,
    WebhookDuplicate,
}

impl std::fmt::Display for LedgerEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LedgerEventType::CreditsGranted => "CREDITS_GRANTED",
            LedgerEventType::CreditsDebited => "CREDITS_DEBITED",
            LedgerEventType::DebitDenied => "DEBIT_DENIED",
            LedgerEventType::RefundIssued => "REFUND_ISSUED",
            LedgerEventType::WebhookDuplicate => "WEBHOOK_DUPLICATE",
        };
        write!(f, "{}", s)
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// End user through a paid action
    User,
    /// Operator/admin
    Admin,
    /// System automation (refunds, reconciliation)
    System,
    /// Payment provider webhook
    PaymentProvider,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::Admin => write!(f, "admin"),
            ActorType::System => write!(f, "system"),
            ActorType::PaymentProvider => write!(f, "payment_provider"),
        }
    }
}

/// A ledger audit event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub account_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub external_event_id: Option<String>,
    pub operation_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub actor_type: String,
    pub created_at: OffsetDateTime,
}

/// Builder for creating ledger audit events
pub struct LedgerEventBuilder {
    account_id: Uuid,
    event_type: LedgerEventType,
    event_data: serde_json::Value,
    external_event_id: Option<String>,
    operation_id: Option<Uuid>,
    request_id: Option<Uuid>,
    actor_type: ActorType,
}

impl LedgerEventBuilder {
    /// Create a new event builder
    pub fn new(account_id: Uuid, event_type: LedgerEventType) -> Self {
        Self {
            account_id,
            event_type,
            event_data: serde_json::json!({}),
            external_event_id: None,
            operation_id: None,
            request_id: None,
            actor_type: ActorType::System,
        }
    }

    /// Set the event data
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    /// Set the external payment event id
    pub fn external_event(mut self, event_id: impl Into<String>) -> Self {
        self.external_event_id = Some(event_id.into());
        self
    }

    /// Set the credit operation this event describes
    pub fn operation(mut self, operation_id: Uuid) -> Self {
        self.operation_id = Some(operation_id);
        self
    }

    /// Set the generation request this event belongs to
    pub fn request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Set the actor type
    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }
}

/// Service for logging and querying ledger audit events
#[derive(Clone)]
pub struct LedgerEventLogger {
    pool: PgPool,
}

impl LedgerEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log a ledger event, returning the new row id
    pub async fn log_event(&self, builder: LedgerEventBuilder) -> LedgerResult<Uuid> {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO ledger_events (
                account_id,
                event_type,
                event_data,
                external_event_id,
                operation_id,
                request_id,
                actor_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(builder.account_id)
        .bind(builder.event_type.to_string())
        .bind(&builder.event_data)
        .bind(&builder.external_event_id)
        .bind(builder.operation_id)
        .bind(builder.request_id)
        .bind(builder.actor_type.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id.0)
    }

    /// Log an event, swallowing any failure.
    ///
    /// The audit trail observes ledger mutations; it must never undo them.
    pub async fn try_log(&self, builder: LedgerEventBuilder) {
        let account_id = builder.account_id;
        let event_type = builder.event_type;
        if let Err(e) = self.log_event(builder).await {
            tracing::warn!(
                account_id = %account_id,
                event_type = %event_type,
                error = %e,
                "Audit log write failed (ignored)"
            );
        }
    }

    /// Get recent events for an account
    pub async fn events_for_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let events: Vec<LedgerEvent> = sqlx::query_as(
            r#"
            SELECT
                id, account_id, event_type, event_data,
                external_event_id, operation_id, request_id, actor_type, created_at
            FROM ledger_events
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Get events by type for an account
    pub async fn events_by_type(
        &self,
        account_id: Uuid,
        event_type: LedgerEventType,
        limit: i64,
    ) -> LedgerResult<Vec<LedgerEvent>> {
        let events: Vec<LedgerEvent> = sqlx::query_as(
            r#"
            SELECT
                id, account_id, event_type, event_data,
                external_event_id, operation_id, request_id, actor_type, created_at
            FROM ledger_events
            WHERE account_id = $1 AND event_type = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(account_id)
        .bind(event_type.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

// Implement FromRow for LedgerEvent
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for LedgerEvent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            event_type: row.try_get("event_type")?,
            event_data: row.try_get("event_data")?,
            external_event_id: row.try_get("external_event_id")?,
            operation_id: row.try_get("operation_id")?,
            request_id: row.try_get("request_id")?,
            actor_type: row.try_get("actor_type")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
