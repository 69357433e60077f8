//! Error handling for the stock reconciliation server
//!
//! Every failure leaves the request boundary as `{ "error": { code, message } }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{DomainError, FieldViolation};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {}", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid query state: {0}")]
    InvalidQueryState(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Transfer confirmation failed on item {item_id}: {reason}")]
    TransferConfirmation { item_id: Uuid, reason: String },

    // External service errors
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(violations) => AppError::Validation(violations),
            DomainError::InvalidState(msg) => AppError::InvalidState(msg),
            DomainError::InvalidQueryState(msg) => AppError::InvalidQueryState(msg),
            DomainError::AccessDenied(msg) => AppError::AccessDenied(msg),
            DomainError::ConcurrentModification(msg) => AppError::ConcurrentModification(msg),
            DomainError::TransferConfirmation { item_id, reason } => {
                AppError::TransferConfirmation { item_id, reason }
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::from(errors).into()
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldViolation>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            details: Vec::new(),
        }
    }
}

impl AppError {
    /// HTTP status and body for this error
    pub fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation(violations) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    field: violations.first().map(|v| v.field.clone()),
                    details: violations.clone(),
                    ..ErrorDetail::new("VALIDATION_ERROR", "Request validation failed")
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InvalidState(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_STATE", msg.clone()),
            ),
            AppError::InvalidQueryState(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_QUERY_STATE", msg.clone()),
            ),
            AppError::AccessDenied(msg) => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new("ACCESS_DENIED", msg.clone()),
            ),
            AppError::ConcurrentModification(msg) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "CONCURRENT_MODIFICATION",
                    format!("{} was modified concurrently, please retry", msg),
                ),
            ),
            AppError::TransferConfirmation { item_id, reason } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    field: Some(item_id.to_string()),
                    ..ErrorDetail::new(
                        "TRANSFER_CONFIRMATION_FAILED",
                        format!("Confirmation failed on item {}: {}; nothing was applied", item_id, reason),
                    )
                },
            ),
            AppError::StorageError(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new("STORAGE_ERROR", "File storage is temporarily unavailable"),
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorDetail::new("PAYLOAD_TOO_LARGE", msg.clone()),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(code = %error_detail.code, "request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_documented_statuses() {
        let cases = [
            (DomainError::invalid("items", "required"), StatusCode::BAD_REQUEST),
            (DomainError::InvalidState("not delivered".into()), StatusCode::BAD_REQUEST),
            (DomainError::AccessDenied("other branch".into()), StatusCode::FORBIDDEN),
            (DomainError::ConcurrentModification("query".into()), StatusCode::CONFLICT),
        ];
        for (domain, expected) in cases {
            let (status, _) = AppError::from(domain).status_and_detail();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn validation_error_carries_every_violation() {
        let err = AppError::from(DomainError::Validation(vec![
            FieldViolation::new("a", "bad"),
            FieldViolation::new("b", "worse"),
        ]));
        let (_, detail) = err.status_and_detail();
        assert_eq!(detail.code, "VALIDATION_ERROR");
        assert_eq!(detail.details.len(), 2);
        assert_eq!(detail.field.as_deref(), Some("a"));
    }

    #[test]
    fn confirmation_failure_names_the_item() {
        let item_id = Uuid::new_v4();
        let (status, detail) = AppError::TransferConfirmation {
            item_id,
            reason: "stock quantity overflow".into(),
        }
        .status_and_detail();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(detail.field, Some(item_id.to_string()));
    }
}
