use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::time::Duration;

use crate::modules::invoices::models::InvoiceStatus;

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// MySQL error numbers surfaced as concurrency conflicts
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// No invoice for the given id within the caller's owner scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record handed in belongs to a different owner than the caller's scope
    #[error("Ownership violation: {0}")]
    OwnershipViolation(String),

    /// Status pair not present in the transition table
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Transition explicitly guarded against (voiding a paid invoice)
    #[error("Forbidden status transition from {from} to {to}: paid invoices are final")]
    ForbiddenTransition {
        from: InvoiceStatus,
        to: InvoiceStatus,
    },

    /// Content change attempted on an invoice whose status no longer allows it
    #[error("Invoice is immutable in status {0}")]
    Immutable(InvoiceStatus),

    /// Lock wait timeout or deadlock reported by the store. Never retried here.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// Operation exceeded its deadline and was rolled back
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// E-invoice exporter rejected the document
    #[error("Export error: {0}")]
    Export(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(mysql_err) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                if matches!(mysql_err.number(), ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK) {
                    return AppError::Conflict(mysql_err.message().to_string());
                }
            }
        }
        AppError::Database(err)
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "message": self.public_message(),
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::OwnershipViolation(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ForbiddenTransition { .. } => StatusCode::FORBIDDEN,
            AppError::Immutable(_) => StatusCode::CONFLICT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Export(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn ownership(msg: impl Into<String>) -> Self {
        AppError::OwnershipViolation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Message safe to show outside the owner scope.
    ///
    /// Not-found and ownership failures collapse into the same text so a caller
    /// cannot probe for invoices belonging to other owners.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(_) | AppError::OwnershipViolation(_) => {
                "Invoice not found".to_string()
            }
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}
