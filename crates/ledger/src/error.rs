//! Ledger error types

use thiserror::Error;
use uuid::Uuid;

/// Ledger-specific errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Webhook signature verification failed")]
    InvalidSignature,

    #[error("Malformed webhook event: {0}")]
    MalformedEvent(String),

    #[error("Could not resolve a price from webhook event: {0}")]
    PriceResolution(String),

    #[error("No plan configured for price: {0}")]
    UnknownPlan(String),

    #[error("Could not resolve an account from webhook event: {0}")]
    UnknownAccount(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Event already processed: {0}")]
    DuplicateEvent(String),

    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Unavailable(err.to_string())
    }
}

/// Check whether a sqlx error is a Postgres unique-constraint violation (23505)
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
