//! Credit Gate
//!
//! Synchronous pre-flight for paid actions. `check_and_reserve` debits
//! atomically before the paid action runs; if the action later fails
//! terminally, [`CreditGate::refund`] issues a compensating grant keyed by
//! the request id. The ledger has no native hold concept, only committed
//! debit + compensating grant, so a crash between debit and refund leaves
//! both rows inspectable in the operation history and the refund stays safe
//! to retry.

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{ActorType, LedgerEventBuilder, LedgerEventLogger, LedgerEventType};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{DebitOutcome, LedgerStore};

/// Proof that credits were debited for a request; required input for a refund
#[derive(Debug, Clone)]
pub struct Authorization {
    pub request_id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub balance_after: i64,
}

/// Result of the gate decision
#[derive(Debug, Clone)]
pub enum GateDecision {
    Authorized(Authorization),
    Denied {
        /// Human-readable reason, surfaced to the caller verbatim
        reason: String,
        balance: i64,
    },
}

/// Read-only pre-flight answer
#[derive(Debug, Clone)]
pub struct CreditCheck {
    pub has_credits: bool,
    pub balance: i64,
}

/// What a refund attempt did
#[derive(Debug, Clone)]
pub enum RefundOutcome {
    Refunded { new_balance: i64 },
    /// A refund for this request id was already applied; no-op
    AlreadyRefunded,
}

/// Gate for debiting credits ahead of paid actions
#[derive(Clone)]
pub struct CreditGate {
    store: LedgerStore,
    audit: LedgerEventLogger,
}

impl CreditGate {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: LedgerStore::new(pool.clone()),
            audit: LedgerEventLogger::new(pool),
        }
    }

    /// Read-only balance check, for the credit-check RPC. Callers that are
    /// about to perform a paid action must use [`Self::check_and_reserve`]
    /// instead; a bare check is advisory and racy by nature.
    pub async fn check(&self, account_id: Uuid, required: i64) -> LedgerResult<CreditCheck> {
        let balance = self.store.balance(account_id).await?;
        Ok(CreditCheck {
            has_credits: balance >= required,
            balance,
        })
    }

    /// Atomically debit `required` credits for a request, or deny.
    ///
    /// The debit row records the request id so the matching refund (if the
    /// paid action fails) ties to it in the audit trail.
    pub async fn check_and_reserve(
        &self,
        account_id: Uuid,
        required: i64,
        request_id: Uuid,
    ) -> LedgerResult<GateDecision> {
        match self
            .store
            .debit_if_available(account_id, required, Some(request_id))
            .await?
        {
            DebitOutcome::Debited {
                operation_id,
                new_balance,
            } => {
                self.audit
                    .try_log(
                        LedgerEventBuilder::new(account_id, LedgerEventType::CreditsDebited)
                            .data(serde_json::json!({
                                "amount": required,
                                "new_balance": new_balance,
                            }))
                            .operation(operation_id)
                            .request(request_id)
                            .actor_type(ActorType::User),
                    )
                    .await;

                Ok(GateDecision::Authorized(Authorization {
                    request_id,
                    account_id,
                    amount: required,
                    balance_after: new_balance,
                }))
            }
            DebitOutcome::Denied { balance, reason } => {
                self.audit
                    .try_log(
                        LedgerEventBuilder::new(account_id, LedgerEventType::DebitDenied)
                            .data(serde_json::json!({
                                "required": required,
                                "balance": balance,
                            }))
                            .request(request_id)
                            .actor_type(ActorType::User),
                    )
                    .await;

                Ok(GateDecision::Denied { reason, balance })
            }
        }
    }

    /// Reverse an authorization's debit with a compensating grant.
    ///
    /// Keyed by the request id with the same idempotency discipline as
    /// webhook grants: retrying after a crash can never double-refund.
    pub async fn refund(&self, authorization: &Authorization) -> LedgerResult<RefundOutcome> {
        let receipt = match self
            .store
            .grant_credits(
                authorization.account_id,
                authorization.amount,
                None,
                Some(authorization.request_id),
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(LedgerError::DuplicateEvent(_)) => {
                tracing::info!(
                    account_id = %authorization.account_id,
                    request_id = %authorization.request_id,
                    "Refund already applied for request, skipping"
                );
                return Ok(RefundOutcome::AlreadyRefunded);
            }
            Err(e) => return Err(e),
        };

        self.audit
            .try_log(
                LedgerEventBuilder::new(authorization.account_id, LedgerEventType::RefundIssued)
                    .data(serde_json::json!({
                        "amount": authorization.amount,
                        "new_balance": receipt.new_balance,
                    }))
                    .operation(receipt.operation_id)
                    .request(authorization.request_id)
                    .actor_type(ActorType::System),
            )
            .await;

        tracing::info!(
            account_id = %authorization.account_id,
            request_id = %authorization.request_id,
            amount = authorization.amount,
            new_balance = receipt.new_balance,
            "Refund issued for failed generation"
        );

        Ok(RefundOutcome::Refunded {
            new_balance: receipt.new_balance,
        })
    }
}
