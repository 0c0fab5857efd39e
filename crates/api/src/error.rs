//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use adforge_generation::GenerationError;
use adforge_ledger::LedgerError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    // Credit errors
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    // Generation errors
    #[error("Prompt rejected: {0}")]
    PromptRejected(String),
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Validation
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),

            // Credits
            ApiError::InsufficientCredits(msg) => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_CREDITS",
                msg.clone(),
            ),

            // Generation
            ApiError::PromptRejected(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PROMPT_TOO_SHORT",
                msg.clone(),
            ),
            ApiError::GenerationFailed(msg) => {
                (StatusCode::BAD_GATEWAY, "GENERATION_FAILED", msg.clone())
            }

            // Internal
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(_) => ApiError::NotFound,
            LedgerError::InsufficientCredits { .. } => {
                ApiError::InsufficientCredits(err.to_string())
            }
            LedgerError::InvalidAmount(msg) => ApiError::BadRequest(msg),
            LedgerError::Unavailable(msg) => {
                tracing::error!(error = %msg, "Ledger unavailable");
                ApiError::ServiceUnavailable
            }
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::PromptTooShort { .. } => ApiError::PromptRejected(err.to_string()),
            GenerationError::InsufficientCredits { reason } => {
                ApiError::InsufficientCredits(reason)
            }
            GenerationError::Exhausted { .. }
            | GenerationError::Provider(_)
            | GenerationError::Resize(_)
            | GenerationError::PartialResize { .. } => {
                ApiError::GenerationFailed(err.to_string())
            }
            GenerationError::Ledger(ledger) => ledger.into(),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_credits_maps_to_payment_required() {
        let err: ApiError = GenerationError::InsufficientCredits {
            reason: "Insufficient credits: 1 required, 0 available".to_string(),
        }
        .into();
        assert!(matches!(err, ApiError::InsufficientCredits(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_prompt_too_short_maps_to_unprocessable() {
        let err: ApiError = GenerationError::PromptTooShort {
            length: 4,
            minimum: 20,
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_exhaustion_maps_to_bad_gateway() {
        let err: ApiError = GenerationError::Exhausted {
            attempts: 4,
            last_error: "upstream 503".to_string(),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_ledger_unavailable_maps_to_service_unavailable() {
        let err: ApiError = LedgerError::Unavailable("connection reset".to_string()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
