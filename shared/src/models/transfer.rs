//! Stock transfer models, lifecycle and receipt confirmation rules

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::branch::AccessContext;
use super::ledger::{InventoryLedger, LedgerDelta, LedgerKey};
use crate::error::{DomainError, DomainResult, FieldViolation};
use crate::types::StoredFile;
use crate::validation::{scale_violation, QUANTITY_SCALE};

/// Transfer lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Draft,
    Dispatched,
    Delivered,
    Confirmed,
    Cancelled,
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::Draft,
        TransferStatus::Dispatched,
        TransferStatus::Delivered,
        TransferStatus::Confirmed,
        TransferStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Draft => "draft",
            TransferStatus::Dispatched => "dispatched",
            TransferStatus::Delivered => "delivered",
            TransferStatus::Confirmed => "confirmed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(TransferStatus::Draft),
            "dispatched" => Some(TransferStatus::Dispatched),
            "delivered" => Some(TransferStatus::Delivered),
            "confirmed" => Some(TransferStatus::Confirmed),
            "cancelled" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    /// Forward-only transitions; cancellation only before arrival
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Draft, Dispatched)
                | (Dispatched, Delivered)
                | (Delivered, Confirmed)
                | (Draft, Cancelled)
                | (Dispatched, Cancelled)
        )
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical condition of received goods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    #[default]
    Good,
    Damaged,
    Expired,
    Partial,
}

impl ItemCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCondition::Good => "good",
            ItemCondition::Damaged => "damaged",
            ItemCondition::Expired => "expired",
            ItemCondition::Partial => "partial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "good" => Some(ItemCondition::Good),
            "damaged" => Some(ItemCondition::Damaged),
            "expired" => Some(ItemCondition::Expired),
            "partial" => Some(ItemCondition::Partial),
            _ => None,
        }
    }
}

/// Per-item reconciliation outcome, persisted at confirmation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    #[default]
    Pending,
    Complete,
    Partial,
    Discrepant,
}

impl CompletionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionState::Pending => "pending",
            CompletionState::Complete => "complete",
            CompletionState::Partial => "partial",
            CompletionState::Discrepant => "discrepant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CompletionState::Pending),
            "complete" => Some(CompletionState::Complete),
            "partial" => Some(CompletionState::Partial),
            "discrepant" => Some(CompletionState::Discrepant),
            _ => None,
        }
    }
}

/// Classify a received line.
///
/// Complete: exact quantity in good condition. Partial: a shortfall of goods
/// that are otherwise fine. Discrepant: overage, damage or expiry.
pub fn classify_receipt(
    expected: Decimal,
    received: Decimal,
    condition: ItemCondition,
) -> CompletionState {
    match condition {
        ItemCondition::Good if received == expected => CompletionState::Complete,
        ItemCondition::Good | ItemCondition::Partial if received < expected => {
            CompletionState::Partial
        }
        _ => CompletionState::Discrepant,
    }
}

/// Named attachment groups on a transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDocuments {
    #[serde(default)]
    pub receipt_photos: Vec<StoredFile>,
    #[serde(default)]
    pub evidence: Vec<StoredFile>,
    #[serde(default)]
    pub supporting_documents: Vec<StoredFile>,
}

/// A line on a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransferItem {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub expected_quantity: Decimal,
    pub received_quantity: Option<Decimal>,
    pub condition: ItemCondition,
    pub notes: Option<String>,
    pub completion_state: CompletionState,
    pub received_at: Option<DateTime<Utc>>,
}

impl StockTransferItem {
    pub fn is_received(&self) -> bool {
        self.received_quantity.is_some()
    }
}

/// Aggregate quantities stored on the transfer row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTotals {
    pub total_expected: Decimal,
    pub total_received: Decimal,
    pub total_damaged: Decimal,
    pub total_spoiled: Decimal,
    pub total_usable: Decimal,
}

impl TransferTotals {
    /// Recompute from items. Damaged goods count as damaged, expired goods as
    /// spoiled; usable is what remains of the received quantity.
    pub fn from_items(items: &[StockTransferItem]) -> Self {
        let mut totals = TransferTotals::default();
        for item in items {
            totals.total_expected += item.expected_quantity;
            if let Some(received) = item.received_quantity {
                totals.total_received += received;
                match item.condition {
                    ItemCondition::Damaged => totals.total_damaged += received,
                    ItemCondition::Expired => totals.total_spoiled += received,
                    ItemCondition::Good | ItemCondition::Partial => {}
                }
            }
        }
        totals.total_usable = totals.total_received - totals.total_damaged - totals.total_spoiled;
        totals
    }

    /// Received share of expected, 0-100. A reporting projection only.
    pub fn completion_percentage(&self) -> Decimal {
        if self.total_expected.is_zero() {
            return Decimal::ZERO;
        }
        (self.total_received / self.total_expected * Decimal::from(100)).round_dp(2)
    }
}

/// A stock transfer between two branches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransfer {
    pub id: Uuid,
    pub transfer_number: String,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub initiated_by: Uuid,
    pub status: TransferStatus,
    pub documents: TransferDocuments,
    pub delivery_notes: Option<String>,
    pub receipt_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub confirmed_date: Option<DateTime<Utc>>,
    pub confirmed_by: Option<Uuid>,
    #[serde(flatten)]
    pub totals: TransferTotals,
    pub items: Vec<StockTransferItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a caller wants to do with a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAction {
    View,
    Dispatch,
    Deliver,
    Cancel,
    Delete,
    Receive,
    AddNote,
}

/// One line of a receipt confirmation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReceipt {
    pub item_id: Uuid,
    pub quantity_received: Decimal,
    #[serde(default)]
    pub condition: ItemCondition,
    pub notes: Option<String>,
}

/// Item changes decided by a confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub item_id: Uuid,
    pub quantity_received: Decimal,
    pub condition: ItemCondition,
    pub notes: Option<String>,
    pub completion_state: CompletionState,
}

/// Everything a confirmation will write, computed before anything is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPlan {
    pub item_updates: Vec<ItemUpdate>,
    pub ledger_deltas: Vec<LedgerDelta>,
    pub totals: TransferTotals,
    pub next_status: TransferStatus,
}

impl ReceiptPlan {
    pub fn completes_transfer(&self) -> bool {
        self.next_status == TransferStatus::Confirmed
    }
}

impl StockTransfer {
    pub fn item(&self, item_id: Uuid) -> Option<&StockTransferItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Branch-scoped authorization. Receiving-side actions belong to the
    /// destination branch, shipping-side actions to the origin.
    pub fn authorize(&self, ctx: &AccessContext, action: TransferAction) -> DomainResult<()> {
        let allowed = match action {
            TransferAction::View | TransferAction::Receive => ctx.covers(self.to_branch_id),
            TransferAction::Dispatch | TransferAction::Cancel | TransferAction::Delete => {
                ctx.covers(self.from_branch_id)
            }
            TransferAction::Deliver | TransferAction::AddNote => {
                ctx.covers(self.from_branch_id) || ctx.covers(self.to_branch_id)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(DomainError::AccessDenied(format!(
                "transfer {} is outside the caller's branch scope",
                self.transfer_number
            )))
        }
    }

    fn require_status(&self, expected: TransferStatus, operation: &str) -> DomainResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DomainError::InvalidState(format!(
                "cannot {} transfer {} in status {} (requires {})",
                operation, self.transfer_number, self.status, expected
            )))
        }
    }

    pub fn mark_dispatched(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.require_status(TransferStatus::Draft, "dispatch")?;
        if self.items.is_empty() {
            return Err(DomainError::InvalidState(format!(
                "transfer {} has no items to dispatch",
                self.transfer_number
            )));
        }
        self.status = TransferStatus::Dispatched;
        self.dispatched_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_delivered(
        &mut self,
        notes: Option<String>,
        photos: Vec<StoredFile>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_status(TransferStatus::Dispatched, "mark delivered")?;
        self.status = TransferStatus::Delivered;
        self.delivered_at = Some(now);
        if notes.is_some() {
            self.delivery_notes = notes;
        }
        self.documents.receipt_photos.extend(photos);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(TransferStatus::Cancelled) {
            return Err(DomainError::InvalidState(format!(
                "transfer {} is {} and can no longer be cancelled",
                self.transfer_number, self.status
            )));
        }
        if reason.trim().is_empty() {
            return Err(DomainError::invalid("reason", "cancellation reason is required"));
        }
        self.status = TransferStatus::Cancelled;
        self.cancellation_reason = Some(reason.trim().to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Validate a confirmation request and compute its effects without
    /// touching any state.
    pub fn plan_receipt(&self, receipts: &[ItemReceipt]) -> DomainResult<ReceiptPlan> {
        self.require_status(TransferStatus::Delivered, "confirm receipt of")?;

        let mut violations = Vec::new();
        if receipts.is_empty() {
            violations.push(FieldViolation::new("items", "at least one item is required"));
        }

        let mut seen = HashSet::new();
        for (idx, receipt) in receipts.iter().enumerate() {
            if self.item(receipt.item_id).is_none() {
                violations.push(FieldViolation::new(
                    format!("items[{}].itemId", idx),
                    format!("item {} does not belong to this transfer", receipt.item_id),
                ));
            }
            if !seen.insert(receipt.item_id) {
                violations.push(FieldViolation::new(
                    format!("items[{}].itemId", idx),
                    "item appears more than once",
                ));
            }
            if receipt.quantity_received < Decimal::ZERO {
                violations.push(FieldViolation::new(
                    format!("items[{}].quantityReceived", idx),
                    "quantity received must not be negative",
                ));
            }
            violations.extend(scale_violation(
                format!("items[{}].quantityReceived", idx),
                receipt.quantity_received,
                QUANTITY_SCALE,
            ));
        }
        DomainError::check(violations)?;

        if let Some(already) = receipts
            .iter()
            .filter_map(|r| self.item(r.item_id))
            .find(|item| item.is_received())
        {
            return Err(DomainError::InvalidState(format!(
                "item {} was already received",
                already.id
            )));
        }

        let mut projected = self.items.clone();
        let mut item_updates = Vec::with_capacity(receipts.len());
        let mut ledger_deltas = Vec::with_capacity(receipts.len());

        for receipt in receipts {
            let Some(item) = projected.iter_mut().find(|i| i.id == receipt.item_id) else {
                continue;
            };
            let state = classify_receipt(
                item.expected_quantity,
                receipt.quantity_received,
                receipt.condition,
            );
            item.received_quantity = Some(receipt.quantity_received);
            item.condition = receipt.condition;
            item.completion_state = state;

            item_updates.push(ItemUpdate {
                item_id: item.id,
                quantity_received: receipt.quantity_received,
                condition: receipt.condition,
                notes: receipt.notes.clone(),
                completion_state: state,
            });

            // Received quantity counts as stock whatever its condition.
            if !receipt.quantity_received.is_zero() {
                ledger_deltas.push(LedgerDelta {
                    key: LedgerKey::new(self.to_branch_id, item.product_id),
                    item_id: item.id,
                    quantity: receipt.quantity_received,
                });
            }
        }

        let next_status = if projected
            .iter()
            .all(|i| i.completion_state == CompletionState::Complete)
        {
            TransferStatus::Confirmed
        } else {
            TransferStatus::Delivered
        };

        Ok(ReceiptPlan {
            item_updates,
            ledger_deltas,
            totals: TransferTotals::from_items(&projected),
            next_status,
        })
    }

    /// Write a validated plan into this transfer
    pub fn apply_receipt_plan(
        &mut self,
        plan: &ReceiptPlan,
        actor: Uuid,
        receipt_notes: Option<String>,
        now: DateTime<Utc>,
    ) {
        for update in &plan.item_updates {
            if let Some(item) = self.items.iter_mut().find(|i| i.id == update.item_id) {
                item.received_quantity = Some(update.quantity_received);
                item.condition = update.condition;
                item.completion_state = update.completion_state;
                item.received_at = Some(now);
                if update.notes.is_some() {
                    item.notes = update.notes.clone();
                }
            }
        }
        self.totals = plan.totals;
        if receipt_notes.is_some() {
            self.receipt_notes = receipt_notes;
        }
        if plan.completes_transfer() {
            self.mark_confirmed(actor, now);
        }
        self.updated_at = now;
    }

    /// Full confirmation against an in-memory ledger: plan, apply the ledger
    /// batch, then update the transfer. Nothing changes if any step fails.
    pub fn confirm_receipt(
        &mut self,
        receipts: &[ItemReceipt],
        ctx: &AccessContext,
        ledger: &mut InventoryLedger,
        receipt_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<ReceiptPlan> {
        self.authorize(ctx, TransferAction::Receive)?;
        let plan = self.plan_receipt(receipts)?;
        ledger.apply_all(&plan.ledger_deltas)?;
        self.apply_receipt_plan(&plan, ctx.user_id, receipt_notes, now);
        Ok(plan)
    }

    /// Close a delivered transfer whose items are all received but not all
    /// complete. Outstanding differences are tracked through queries.
    pub fn finalize_with_discrepancies(
        &mut self,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.require_status(TransferStatus::Delivered, "finalize")?;
        let pending = self.items.iter().filter(|i| !i.is_received()).count();
        if pending > 0 {
            return Err(DomainError::InvalidState(format!(
                "transfer {} still has {} item(s) awaiting receipt",
                self.transfer_number, pending
            )));
        }
        self.mark_confirmed(actor, now);
        self.updated_at = now;
        Ok(())
    }

    fn mark_confirmed(&mut self, actor: Uuid, now: DateTime<Utc>) {
        self.status = TransferStatus::Confirmed;
        self.confirmed_date = Some(now);
        self.confirmed_by = Some(actor);
    }

    pub fn has_discrepancies(&self) -> bool {
        self.items.iter().any(|i| {
            matches!(
                i.completion_state,
                CompletionState::Partial | CompletionState::Discrepant
            )
        })
    }
}

/// Append-only note on a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferNote {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub author_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_with(expected: &[i64]) -> StockTransfer {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let items: Vec<StockTransferItem> = expected
            .iter()
            .map(|qty| StockTransferItem {
                id: Uuid::new_v4(),
                transfer_id: id,
                product_id: Uuid::new_v4(),
                batch_id: None,
                expected_quantity: Decimal::from(*qty),
                received_quantity: None,
                condition: ItemCondition::Good,
                notes: None,
                completion_state: CompletionState::Pending,
                received_at: None,
            })
            .collect();
        StockTransfer {
            id,
            transfer_number: "TRF-20260301-0001".to_string(),
            from_branch_id: Uuid::new_v4(),
            to_branch_id: Uuid::new_v4(),
            initiated_by: Uuid::new_v4(),
            status: TransferStatus::Draft,
            documents: TransferDocuments::default(),
            delivery_notes: None,
            receipt_notes: None,
            cancellation_reason: None,
            dispatched_at: None,
            delivered_at: None,
            confirmed_date: None,
            confirmed_by: None,
            totals: TransferTotals::from_items(&items),
            items,
            created_at: now,
            updated_at: now,
        }
    }

    fn receipt(item: &StockTransferItem, qty: i64, condition: ItemCondition) -> ItemReceipt {
        ItemReceipt {
            item_id: item.id,
            quantity_received: Decimal::from(qty),
            condition,
            notes: None,
        }
    }

    #[test]
    fn classification_rules() {
        let ten = Decimal::from(10);
        assert_eq!(
            classify_receipt(ten, ten, ItemCondition::Good),
            CompletionState::Complete
        );
        assert_eq!(
            classify_receipt(ten, Decimal::from(7), ItemCondition::Good),
            CompletionState::Partial
        );
        assert_eq!(
            classify_receipt(ten, Decimal::from(7), ItemCondition::Partial),
            CompletionState::Partial
        );
        assert_eq!(
            classify_receipt(ten, Decimal::from(12), ItemCondition::Good),
            CompletionState::Discrepant
        );
        assert_eq!(
            classify_receipt(ten, ten, ItemCondition::Damaged),
            CompletionState::Discrepant
        );
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let now = Utc::now();
        let mut t = transfer_with(&[5]);
        t.mark_dispatched(now).unwrap();
        assert!(matches!(
            t.mark_dispatched(now),
            Err(DomainError::InvalidState(_))
        ));
        t.mark_delivered(Some("arrived".into()), vec![], now).unwrap();
        assert_eq!(t.status, TransferStatus::Delivered);
        assert!(matches!(
            t.cancel("too late", now),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn empty_draft_cannot_be_dispatched() {
        let mut t = transfer_with(&[]);
        assert!(matches!(
            t.mark_dispatched(Utc::now()),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn cancel_requires_reason() {
        let mut t = transfer_with(&[1]);
        assert!(matches!(
            t.cancel("  ", Utc::now()),
            Err(DomainError::Validation(_))
        ));
        t.cancel("duplicate order", Utc::now()).unwrap();
        assert_eq!(t.status, TransferStatus::Cancelled);
    }

    #[test]
    fn plan_collects_every_violation() {
        let now = Utc::now();
        let mut t = transfer_with(&[10]);
        t.mark_dispatched(now).unwrap();
        t.mark_delivered(None, vec![], now).unwrap();

        let stranger = ItemReceipt {
            item_id: Uuid::new_v4(),
            quantity_received: Decimal::ONE,
            condition: ItemCondition::Good,
            notes: None,
        };
        let negative = receipt(&t.items[0], -1, ItemCondition::Good);

        match t.plan_receipt(&[stranger, negative]) {
            Err(DomainError::Validation(violations)) => assert_eq!(violations.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn receipt_finer_than_storage_is_rejected() {
        let now = Utc::now();
        let mut t = transfer_with(&[10]);
        t.mark_dispatched(now).unwrap();
        t.mark_delivered(None, vec![], now).unwrap();

        let too_fine = ItemReceipt {
            item_id: t.items[0].id,
            quantity_received: Decimal::new(100_004, 4),
            condition: ItemCondition::Good,
            notes: None,
        };
        match t.plan_receipt(&[too_fine]) {
            Err(DomainError::Validation(violations)) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "items[0].quantityReceived");
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let stored_scale = ItemReceipt {
            item_id: t.items[0].id,
            quantity_received: Decimal::new(10_000, 3),
            condition: ItemCondition::Good,
            notes: None,
        };
        let plan = t.plan_receipt(&[stored_scale]).unwrap();
        assert_eq!(plan.item_updates[0].completion_state, CompletionState::Complete);
        assert_eq!(plan.next_status, TransferStatus::Confirmed);
    }

    #[test]
    fn totals_split_damaged_and_spoiled() {
        let now = Utc::now();
        let mut t = transfer_with(&[10, 10, 10]);
        t.mark_dispatched(now).unwrap();
        t.mark_delivered(None, vec![], now).unwrap();
        let receipts = vec![
            receipt(&t.items[0], 10, ItemCondition::Good),
            receipt(&t.items[1], 4, ItemCondition::Damaged),
            receipt(&t.items[2], 3, ItemCondition::Expired),
        ];
        let plan = t.plan_receipt(&receipts).unwrap();
        assert_eq!(plan.totals.total_expected, Decimal::from(30));
        assert_eq!(plan.totals.total_received, Decimal::from(17));
        assert_eq!(plan.totals.total_damaged, Decimal::from(4));
        assert_eq!(plan.totals.total_spoiled, Decimal::from(3));
        assert_eq!(plan.totals.total_usable, Decimal::from(10));
        assert_eq!(plan.ledger_deltas.len(), 3);
        assert_eq!(plan.next_status, TransferStatus::Delivered);
    }

    #[test]
    fn finalize_requires_all_items_received() {
        let now = Utc::now();
        let actor = Uuid::new_v4();
        let mut t = transfer_with(&[10, 5]);
        t.mark_dispatched(now).unwrap();
        t.mark_delivered(None, vec![], now).unwrap();
        let plan = t
            .plan_receipt(&[receipt(&t.items[0], 8, ItemCondition::Good)])
            .unwrap();
        t.apply_receipt_plan(&plan, actor, None, now);
        assert!(t.finalize_with_discrepancies(actor, now).is_err());

        let plan = t
            .plan_receipt(&[receipt(&t.items[1], 5, ItemCondition::Good)])
            .unwrap();
        t.apply_receipt_plan(&plan, actor, None, now);
        assert_eq!(t.status, TransferStatus::Delivered);
        assert!(t.has_discrepancies());

        t.finalize_with_discrepancies(actor, now).unwrap();
        assert_eq!(t.status, TransferStatus::Confirmed);
        assert_eq!(t.confirmed_by, Some(actor));
    }

    #[test]
    fn completion_percentage_is_projection() {
        let totals = TransferTotals {
            total_expected: Decimal::from(8),
            total_received: Decimal::from(6),
            ..Default::default()
        };
        assert_eq!(totals.completion_percentage(), Decimal::from(75));
        assert_eq!(TransferTotals::default().completion_percentage(), Decimal::ZERO);
    }
}
