//! Payment provider configuration

use crate::error::{LedgerError, LedgerResult};

/// Default replay tolerance for webhook signatures (seconds)
const DEFAULT_SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Configuration for the payment provider integration
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Shared secret used to verify webhook signatures
    pub webhook_secret: String,
    /// Maximum age of a signed webhook before it is rejected as a replay
    pub signature_tolerance_secs: i64,
}

impl PaymentConfig {
    /// Create config from environment variables
    pub fn from_env() -> LedgerResult<Self> {
        let webhook_secret = std::env::var("PAYMENT_WEBHOOK_SECRET")
            .map_err(|_| LedgerError::Config("PAYMENT_WEBHOOK_SECRET not set".to_string()))?;

        // Webhook secrets shorter than this are trivially brute-forceable
        if webhook_secret.len() < 32 {
            return Err(LedgerError::Config(
                "PAYMENT_WEBHOOK_SECRET must be at least 32 characters".to_string(),
            ));
        }

        let signature_tolerance_secs = std::env::var("PAYMENT_WEBHOOK_TOLERANCE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SIGNATURE_TOLERANCE_SECS);

        Ok(Self {
            webhook_secret,
            signature_tolerance_secs,
        })
    }
}
