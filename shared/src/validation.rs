//! Request payloads and their validation rules
//!
//! Field-level rules are declared with `validator`; cross-field rules are
//! collected by hand so every violation is reported in one error.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{DomainError, DomainResult, FieldViolation};
use crate::models::{ImpactCategory, ItemReceipt, QueryPriority, QueryType};
use crate::types::StoredFile;

/// Decimal places stored for quantities
pub const QUANTITY_SCALE: u32 = 3;

/// Decimal places stored for money amounts
pub const AMOUNT_SCALE: u32 = 2;

/// Violation when `value` has more decimal places than the database keeps.
/// Trailing zeros do not count.
pub fn scale_violation(
    field: impl Into<String>,
    value: Decimal,
    max_scale: u32,
) -> Option<FieldViolation> {
    if value.normalize().scale() > max_scale {
        Some(FieldViolation::new(
            field,
            format!("at most {} decimal places are allowed", max_scale),
        ))
    } else {
        None
    }
}

/// Collect `validator` violations as a list so hand-written checks can add to it
fn declared_violations<T: Validate>(input: &T) -> Vec<FieldViolation> {
    match input.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => match DomainError::from(errors) {
            DomainError::Validation(v) => v,
            _ => Vec::new(),
        },
    }
}

// ============================================================================
// Transfers
// ============================================================================

/// Body of `POST /transfers`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferInput {
    /// Defaults to the caller's branch; only admins may name another origin
    pub from_branch_id: Option<Uuid>,
    pub to_branch_id: Uuid,
    #[validate(length(max = 2000, message = "delivery notes are too long"))]
    pub delivery_notes: Option<String>,
    #[validate(length(min = 1, message = "at least one item is required"))]
    pub items: Vec<CreateTransferItemInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransferItemInput {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub expected_quantity: Decimal,
    pub notes: Option<String>,
}

/// Validate a new transfer once its origin is known
pub fn validate_new_transfer(from_branch_id: Uuid, input: &CreateTransferInput) -> DomainResult<()> {
    let mut violations = declared_violations(input);

    if from_branch_id == input.to_branch_id {
        violations.push(FieldViolation::new(
            "toBranchId",
            "destination branch must differ from origin branch",
        ));
    }

    let mut lines = HashSet::new();
    for (idx, item) in input.items.iter().enumerate() {
        if item.expected_quantity <= Decimal::ZERO {
            violations.push(FieldViolation::new(
                format!("items[{}].expectedQuantity", idx),
                "expected quantity must be positive",
            ));
        }
        violations.extend(scale_violation(
            format!("items[{}].expectedQuantity", idx),
            item.expected_quantity,
            QUANTITY_SCALE,
        ));
        if !lines.insert((item.product_id, item.batch_id)) {
            violations.push(FieldViolation::new(
                format!("items[{}].productId", idx),
                "product and batch already listed on this transfer",
            ));
        }
    }

    DomainError::check(violations)
}

/// Body of `POST /transfers/{id}/deliver`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkDeliveredInput {
    pub notes: Option<String>,
    #[serde(default)]
    pub photos: Vec<StoredFile>,
}

/// Body of `POST /transfers/{id}/cancel`
#[derive(Debug, Clone, Deserialize)]
pub struct CancelTransferInput {
    pub reason: String,
}

/// Body of `POST /transfers/{id}/confirm-receipt`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmReceiptInput {
    pub items: Vec<ItemReceipt>,
    pub overall_notes: Option<String>,
}

/// Body of `POST /transfers/{id}/notes`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddTransferNoteInput {
    #[validate(length(min = 1, max = 2000, message = "note must be 1-2000 characters"))]
    pub message: String,
}

impl AddTransferNoteInput {
    /// Declared rules plus a blank check on the trimmed message
    pub fn check(&self) -> DomainResult<()> {
        let mut violations = declared_violations(self);
        if self.message.trim().is_empty() && violations.is_empty() {
            violations.push(FieldViolation::new("message", "message is required"));
        }
        DomainError::check(violations)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Body of `POST /queries`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueryInput {
    pub stock_transfer_id: Uuid,
    pub stock_transfer_item_id: Option<Uuid>,
    pub query_type: QueryType,
    pub priority: QueryPriority,
    #[validate(length(min = 3, max = 255, message = "title must be 3-255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "description is required"))]
    pub description: String,
    pub expected_quantity: Option<Decimal>,
    pub actual_quantity: Option<Decimal>,
    #[serde(default)]
    pub evidence: Vec<StoredFile>,
}

impl CreateQueryInput {
    pub fn check(&self) -> DomainResult<()> {
        let mut violations = declared_violations(self);
        for (field, value) in [
            ("expectedQuantity", self.expected_quantity),
            ("actualQuantity", self.actual_quantity),
        ] {
            let Some(value) = value else { continue };
            if value < Decimal::ZERO {
                violations.push(FieldViolation::new(field, "quantity must not be negative"));
            }
            violations.extend(scale_violation(field, value, QUANTITY_SCALE));
        }
        DomainError::check(violations)
    }
}

/// Body of `POST /queries/{id}/responses`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddResponseInput {
    #[validate(length(min = 1, max = 5000, message = "message must be 1-5000 characters"))]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<StoredFile>,
    #[serde(default)]
    pub is_internal: bool,
}

/// Body of `POST /queries/{id}/assign`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignQueryInput {
    pub assignee_id: Uuid,
}

/// Body of `POST /queries/{id}/financial-impacts`, also nested in resolve
#[derive(Debug, Clone, Deserialize)]
pub struct RecordImpactInput {
    pub amount: Decimal,
    pub category: ImpactCategory,
    pub description: Option<String>,
}

/// Body of `POST /queries/{id}/resolve`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveQueryInput {
    pub resolution_note: String,
    #[serde(default)]
    pub financial_impacts: Vec<RecordImpactInput>,
}

/// Body of `POST /queries/{id}/close`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloseQueryInput {
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_input(to: Uuid, quantities: &[i64]) -> CreateTransferInput {
        let product = Uuid::new_v4();
        CreateTransferInput {
            from_branch_id: None,
            to_branch_id: to,
            delivery_notes: None,
            items: quantities
                .iter()
                .map(|q| CreateTransferItemInput {
                    product_id: product,
                    batch_id: Some(Uuid::new_v4()),
                    expected_quantity: Decimal::from(*q),
                    notes: None,
                })
                .collect(),
        }
    }

    #[test]
    fn same_branch_transfer_is_rejected() {
        let branch = Uuid::new_v4();
        let err = validate_new_transfer(branch, &transfer_input(branch, &[1])).unwrap_err();
        assert!(matches!(err, DomainError::Validation(v) if v[0].field == "toBranchId"));
    }

    #[test]
    fn every_bad_line_is_reported() {
        let err = validate_new_transfer(Uuid::new_v4(), &transfer_input(Uuid::new_v4(), &[0, -2, 4]))
            .unwrap_err();
        match err {
            DomainError::Validation(v) => assert_eq!(v.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_transfer_is_rejected() {
        let err = validate_new_transfer(Uuid::new_v4(), &transfer_input(Uuid::new_v4(), &[]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(v) if v[0].field == "items"));
    }

    #[test]
    fn quantities_finer_than_storage_are_rejected() {
        let mut input = transfer_input(Uuid::new_v4(), &[4]);
        input.items[0].expected_quantity = Decimal::new(100_004, 4);
        let err = validate_new_transfer(Uuid::new_v4(), &input).unwrap_err();
        assert!(
            matches!(err, DomainError::Validation(v) if v.len() == 1 && v[0].field == "items[0].expectedQuantity")
        );

        // 12.5000 is 12.5 once trailing zeros are dropped
        input.items[0].expected_quantity = Decimal::new(125_000, 4);
        assert!(validate_new_transfer(Uuid::new_v4(), &input).is_ok());
    }

    #[test]
    fn scale_violation_honours_limit() {
        assert!(scale_violation("amount", Decimal::new(1999, 2), AMOUNT_SCALE).is_none());
        let violation = scale_violation("amount", Decimal::new(19_999, 3), AMOUNT_SCALE).unwrap();
        assert_eq!(violation.field, "amount");
    }

    #[test]
    fn blank_note_is_rejected_after_trimming() {
        let blank = AddTransferNoteInput {
            message: "   ".to_string(),
        };
        assert!(matches!(
            blank.check(),
            Err(DomainError::Validation(v)) if v[0].field == "message"
        ));

        let note = AddTransferNoteInput {
            message: " Pallet 3 re-wrapped ".to_string(),
        };
        assert!(note.check().is_ok());
    }

    #[test]
    fn query_quantities_keep_storage_scale() {
        let input = CreateQueryInput {
            stock_transfer_id: Uuid::new_v4(),
            stock_transfer_item_id: None,
            query_type: QueryType::WeightDifference,
            priority: QueryPriority::High,
            title: "Short weight".to_string(),
            description: "Scale reads under the delivery note".to_string(),
            expected_quantity: Some(Decimal::new(25, 0)),
            actual_quantity: Some(Decimal::new(249_995, 4)),
            evidence: vec![],
        };
        match input.check() {
            Err(DomainError::Validation(v)) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0].field, "actualQuantity");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn query_input_checks_title_and_quantities() {
        let input = CreateQueryInput {
            stock_transfer_id: Uuid::new_v4(),
            stock_transfer_item_id: None,
            query_type: QueryType::Other,
            priority: QueryPriority::Low,
            title: "x".to_string(),
            description: "something off".to_string(),
            expected_quantity: Some(Decimal::from(-1)),
            actual_quantity: None,
            evidence: vec![],
        };
        match input.check() {
            Err(DomainError::Validation(v)) => {
                assert!(v.iter().any(|f| f.field == "title"));
                assert!(v.iter().any(|f| f.field == "expectedQuantity"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
