//! Ledger Store
//!
//! Durable record of credit balances and operation history. All balance
//! mutations go through the two atomic primitives in this module; no caller
//! ever reads a balance and writes it back outside a transaction.
//!
//! ## Invariants
//!
//! - `accounts.credit_balance >= 0`, enforced at the debit boundary (and by a
//!   CHECK constraint as a backstop)
//! - every attempted mutation appends exactly one `credit_operations` row
//! - a successful grant for a given external event id or refund request id
//!   exists at most once (partial unique indexes)

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{is_unique_violation, LedgerError, LedgerResult};

/// Kind of a ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Grant,
    Debit,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Grant => write!(f, "grant"),
            OperationKind::Debit => write!(f, "debit"),
        }
    }
}

/// Outcome status of a ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Failed,
}

/// One row of the append-only operation history
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CreditOperation {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: OperationKind,
    pub amount: i64,
    pub status: OperationStatus,
    pub error_message: Option<String>,
    /// External payment event that caused this operation (grants only)
    pub external_event_id: Option<String>,
    /// Generation request this operation gates or refunds
    pub request_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Result of a successful grant
#[derive(Debug, Clone)]
pub struct GrantReceipt {
    pub operation_id: Uuid,
    pub new_balance: i64,
}

/// Result of a debit attempt
#[derive(Debug, Clone)]
pub enum DebitOutcome {
    Debited {
        operation_id: Uuid,
        new_balance: i64,
    },
    Denied {
        balance: i64,
        reason: String,
    },
}

/// Store exposing the two atomic ledger primitives
#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Increment an account's balance and append a `grant` operation row in
    /// one transaction.
    ///
    /// Idempotency is the caller's concern: a grant carrying an
    /// `external_event_id` (webhook grants) or a `request_id` (refunds) hits
    /// a partial unique index, and a replay surfaces as
    /// [`LedgerError::DuplicateEvent`] with no balance change.
    pub async fn grant_credits(
        &self,
        account_id: Uuid,
        amount: i64,
        external_event_id: Option<&str>,
        request_id: Option<Uuid>,
    ) -> LedgerResult<GrantReceipt> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "grant amount must be positive, got {}",
                amount
            )));
        }

        let mut tx = self.pool.begin().await?;

        let operation_id = Uuid::new_v4();
        let insert = sqlx::query(
            r#"
            INSERT INTO credit_operations (
                id, account_id, kind, amount, status, external_event_id, request_id
            )
            VALUES ($1, $2, 'grant', $3, 'success', $4, $5)
            "#,
        )
        .bind(operation_id)
        .bind(account_id)
        .bind(amount)
        .bind(external_event_id)
        .bind(request_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert {
            if is_unique_violation(&e) {
                let key = external_event_id
                    .map(str::to_string)
                    .or_else(|| request_id.map(|r| r.to_string()))
                    .unwrap_or_default();
                return Err(LedgerError::DuplicateEvent(key));
            }
            return Err(e.into());
        }

        let new_balance: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET credit_balance = credit_balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING credit_balance
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((new_balance,)) = new_balance else {
            // Rolls back the operation row insert
            return Err(LedgerError::AccountNotFound(account_id));
        };

        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = amount,
            new_balance = new_balance,
            external_event_id = ?external_event_id,
            request_id = ?request_id,
            "Credits granted"
        );

        Ok(GrantReceipt {
            operation_id,
            new_balance,
        })
    }

    /// Debit an account only if its balance covers the amount.
    ///
    /// The account row is locked with `SELECT ... FOR UPDATE` so two
    /// concurrent debits serialize: the second observes the balance left by
    /// the first, never the balance both started from. A denial commits a
    /// `failed` operation row for the audit trail but leaves the balance
    /// untouched.
    pub async fn debit_if_available(
        &self,
        account_id: Uuid,
        amount: i64,
        request_id: Option<Uuid>,
    ) -> LedgerResult<DebitOutcome> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }

        let mut tx = self.pool.begin().await?;

        let balance: Option<(i64,)> =
            sqlx::query_as("SELECT credit_balance FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((balance,)) = balance else {
            return Err(LedgerError::AccountNotFound(account_id));
        };

        let operation_id = Uuid::new_v4();

        if balance < amount {
            let reason = LedgerError::InsufficientCredits {
                required: amount,
                available: balance,
            }
            .to_string();

            sqlx::query(
                r#"
                INSERT INTO credit_operations (
                    id, account_id, kind, amount, status, error_message, request_id
                )
                VALUES ($1, $2, 'debit', $3, 'failed', $4, $5)
                "#,
            )
            .bind(operation_id)
            .bind(account_id)
            .bind(amount)
            .bind(&reason)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            tracing::info!(
                account_id = %account_id,
                amount = amount,
                balance = balance,
                "Debit denied: insufficient credits"
            );

            return Ok(DebitOutcome::Denied { balance, reason });
        }

        let (new_balance,): (i64,) = sqlx::query_as(
            r#"
            UPDATE accounts
            SET credit_balance = credit_balance - $2, updated_at = NOW()
            WHERE id = $1
            RETURNING credit_balance
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO credit_operations (
                id, account_id, kind, amount, status, request_id
            )
            VALUES ($1, $2, 'debit', $3, 'success', $4)
            "#,
        )
        .bind(operation_id)
        .bind(account_id)
        .bind(amount)
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = amount,
            new_balance = new_balance,
            request_id = ?request_id,
            "Credits debited"
        );

        Ok(DebitOutcome::Debited {
            operation_id,
            new_balance,
        })
    }

    /// Current balance for an account
    pub async fn balance(&self, account_id: Uuid) -> LedgerResult<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT credit_balance FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(b,)| b)
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Whether a successful grant already exists for an external event id
    pub async fn has_grant_for_event(&self, external_event_id: &str) -> LedgerResult<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM credit_operations
            WHERE external_event_id = $1 AND kind = 'grant' AND status = 'success'
            "#,
        )
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Recent operation history for an account, newest first
    pub async fn operations(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> LedgerResult<Vec<CreditOperation>> {
        let ops: Vec<CreditOperation> = sqlx::query_as(
            r#"
            SELECT
                id, account_id, kind, amount, status,
                error_message, external_event_id, request_id, created_at
            FROM credit_operations
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(ops)
    }
}
