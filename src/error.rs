use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bigdecimal::BigDecimal;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("sponsor change rejected: {candidate} is in the downline of {user}")]
    Cycle { user: String, candidate: String },

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("insufficient funds: available={available}, requested={requested}")]
    InsufficientFunds {
        available: BigDecimal,
        requested: BigDecimal,
    },

    #[error("ledger inconsistency: {0}")]
    Consistency(String),

    #[error("this operation requires administrator privileges")]
    Unauthorized,

    #[error("storage error: {0}")]
    Store(String),
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            LedgerError::Validation(_) => {
                tracing::warn!("validation error: {}", self);
                (StatusCode::BAD_REQUEST, "Validation failed")
            }
            LedgerError::NotFound(_, _) => {
                tracing::warn!("not found: {}", self);
                (StatusCode::NOT_FOUND, "Record not found")
            }
            LedgerError::Cycle { .. } => {
                tracing::warn!("cycle rejected: {}", self);
                (StatusCode::CONFLICT, "Sponsor change would create a cycle")
            }
            LedgerError::Duplicate(_) => {
                tracing::warn!("duplicate: {}", self);
                (StatusCode::CONFLICT, "Record already exists")
            }
            LedgerError::InsufficientFunds { .. } => {
                tracing::warn!("insufficient funds: {}", self);
                (StatusCode::BAD_REQUEST, "Insufficient funds")
            }
            LedgerError::Consistency(_) => {
                tracing::error!("consistency error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ledger inconsistency detected")
            }
            LedgerError::Unauthorized => {
                tracing::warn!("unauthorized operation");
                (StatusCode::FORBIDDEN, "Administrator privileges required")
            }
            LedgerError::Store(_) => {
                tracing::error!("storage error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error occurred")
            }
        };

        let body = Json(json!({
            "error": message,
            "details": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<diesel::result::Error> for LedgerError {
    fn from(error: diesel::result::Error) -> Self {
        match &error {
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                info,
            ) => LedgerError::Duplicate(info.message().to_string()),
            _ => LedgerError::Store(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
