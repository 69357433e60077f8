//! WebAssembly bindings for the browser receipt form
//!
//! Lets the form classify lines, preview a confirmation and show totals and
//! the branch quality score without a server round trip. Every preview runs
//! the same rules the server applies.

use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    classify_receipt, quality_score, validate_new_transfer, CreateTransferInput, DomainError,
    ItemCondition, ItemReceipt, StockTransfer, StockTransferItem, TransferTotals,
};
use uuid::Uuid;
use wasm_bindgen::prelude::*;

/// Classify one received line: "complete", "partial" or "discrepant"
#[wasm_bindgen]
pub fn classify_receipt_line(
    expected: &str,
    received: &str,
    condition: &str,
) -> Result<String, JsValue> {
    classify_line(expected, received, condition).map_err(|e| JsValue::from_str(&e))
}

/// Preview a confirmation. Returns `{kind: "accepted", plan}` or
/// `{kind: "rejected", code, message}` when the server would reject it.
#[wasm_bindgen]
pub fn preview_receipt(transfer_json: &str, receipts_json: &str) -> Result<JsValue, JsValue> {
    let json = plan_preview(transfer_json, receipts_json).map_err(|e| JsValue::from_str(&e))?;
    let value = js_sys::JSON::parse(&json)?;
    if js_sys::Reflect::get(&value, &JsValue::from_str("kind"))? == JsValue::from_str("rejected") {
        web_sys::console::warn_1(&JsValue::from_str("receipt preview rejected"));
    }
    Ok(value)
}

/// Aggregate totals for a list of items
#[wasm_bindgen]
pub fn transfer_totals(items_json: &str) -> Result<JsValue, JsValue> {
    let json = totals_for(items_json).map_err(|e| JsValue::from_str(&e))?;
    js_sys::JSON::parse(&json)
}

/// Validate a transfer draft before submitting. Returns a JSON list of
/// field violations, empty when the draft is acceptable.
#[wasm_bindgen]
pub fn validate_transfer_draft(from_branch_id: &str, input_json: &str) -> Result<String, JsValue> {
    draft_violations(from_branch_id, input_json).map_err(|e| JsValue::from_str(&e))
}

/// Branch quality score for the given counts
#[wasm_bindgen]
pub fn branch_quality_score(query_count: i32, transfer_count: i32) -> f64 {
    let score = quality_score(i64::from(query_count), i64::from(transfer_count));
    score.to_string().parse().unwrap_or(0.0)
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    value
        .trim()
        .parse()
        .map_err(|e| format!("Invalid {}: {}", field, e))
}

fn classify_line(expected: &str, received: &str, condition: &str) -> Result<String, String> {
    let expected = parse_decimal("expected quantity", expected)?;
    let received = parse_decimal("received quantity", received)?;
    let condition = ItemCondition::from_str(condition)
        .ok_or_else(|| format!("Unknown condition: {}", condition))?;
    Ok(classify_receipt(expected, received, condition).as_str().to_string())
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum PreviewOutcome<T> {
    Accepted { plan: T },
    Rejected { code: &'static str, message: String },
}

fn error_code(err: &DomainError) -> &'static str {
    match err {
        DomainError::Validation(_) => "VALIDATION_ERROR",
        DomainError::InvalidState(_) => "INVALID_STATE",
        DomainError::InvalidQueryState(_) => "INVALID_QUERY_STATE",
        DomainError::AccessDenied(_) => "ACCESS_DENIED",
        DomainError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
        DomainError::TransferConfirmation { .. } => "TRANSFER_CONFIRMATION_FAILED",
    }
}

fn plan_preview(transfer_json: &str, receipts_json: &str) -> Result<String, String> {
    let transfer: StockTransfer = serde_json::from_str(transfer_json)
        .map_err(|e| format!("Invalid transfer JSON: {}", e))?;
    let receipts: Vec<ItemReceipt> = serde_json::from_str(receipts_json)
        .map_err(|e| format!("Invalid receipts JSON: {}", e))?;

    let outcome = match transfer.plan_receipt(&receipts) {
        Ok(plan) => PreviewOutcome::Accepted { plan },
        Err(err) => PreviewOutcome::Rejected {
            code: error_code(&err),
            message: err.to_string(),
        },
    };
    serde_json::to_string(&outcome).map_err(|e| e.to_string())
}

fn totals_for(items_json: &str) -> Result<String, String> {
    let items: Vec<StockTransferItem> =
        serde_json::from_str(items_json).map_err(|e| format!("Invalid items JSON: {}", e))?;
    serde_json::to_string(&TransferTotals::from_items(&items)).map_err(|e| e.to_string())
}

fn draft_violations(from_branch_id: &str, input_json: &str) -> Result<String, String> {
    let from_branch_id =
        Uuid::parse_str(from_branch_id).map_err(|e| format!("Invalid branch id: {}", e))?;
    let input: CreateTransferInput =
        serde_json::from_str(input_json).map_err(|e| format!("Invalid draft JSON: {}", e))?;

    let violations = match validate_new_transfer(from_branch_id, &input) {
        Ok(()) => Vec::new(),
        Err(DomainError::Validation(violations)) => violations,
        Err(other) => return Err(other.to_string()),
    };
    serde_json::to_string(&violations).map_err(|e| e.to_string())
}
