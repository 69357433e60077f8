//! Domain error taxonomy shared by the backend and the WASM bindings

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A single rejected input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by domain rules. None of them leave state partially applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldViolation>),

    #[error("Invalid transfer state: {0}")]
    InvalidState(String),

    #[error("Invalid query state: {0}")]
    InvalidQueryState(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(String),

    #[error("Transfer confirmation failed on item {item_id}: {reason}")]
    TransferConfirmation { item_id: Uuid, reason: String },
}

impl DomainError {
    /// Shorthand for a validation error on one field
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Turn a list of collected violations into a result
    pub fn check(violations: Vec<FieldViolation>) -> DomainResult<()> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(violations))
        }
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut violations: Vec<FieldViolation> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldViolation::new(field.to_string(), message)
                })
            })
            .collect();
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        DomainError::Validation(violations)
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
