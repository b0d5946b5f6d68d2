use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy shared by settlement services.
///
/// Every rejected operation surfaces one of these with enough structure for
/// the caller to act on: batch failures carry the exact failing subset,
/// overpayments carry the outstanding balance.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(anyhow::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Record is locked: {0}")]
    Locked(anyhow::Error),

    #[error("{requested} subtrip(s) requested but only {eligible} eligible")]
    PartialEligibility {
        requested: usize,
        eligible: usize,
        missing: Vec<Uuid>,
    },

    #[error("Payment of {attempted} exceeds outstanding balance {outstanding}")]
    Overpayment {
        attempted: Decimal,
        outstanding: Decimal,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            failed_ids: Option<Vec<Uuid>>,
        }

        let (status, error_message, details, failed_ids) = match self {
            AppError::ValidationError(err) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string(), None, None)
            }
            AppError::InvalidInput(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None, None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None, None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None, None),
            AppError::Locked(err) => (StatusCode::LOCKED, err.to_string(), None, None),
            AppError::PartialEligibility {
                requested,
                eligible,
                missing,
            } => (
                StatusCode::CONFLICT,
                format!(
                    "{} subtrip(s) requested but only {} eligible",
                    requested, eligible
                ),
                Some("subtrips already claimed, missing, or in a non-eligible status".to_string()),
                Some(missing),
            ),
            AppError::Overpayment {
                attempted,
                outstanding,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!(
                    "Payment of {} exceeds outstanding balance {}",
                    attempted, outstanding
                ),
                None,
                None,
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#}", err)),
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
                None,
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
                None,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
                failed_ids,
            }),
        )
            .into_response()
    }
}
