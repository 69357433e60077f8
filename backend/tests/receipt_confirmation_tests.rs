//! Receipt confirmation tests
//!
//! Covers the confirmation rules the server applies inside its transaction:
//! - all-or-nothing ledger application
//! - no double application of an item
//! - status only reaches confirmed when every item is complete
//! - aggregate totals survive a serde round trip

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    lock_order, AccessContext, CompletionState, DomainError, InventoryLedger, ItemCondition,
    ItemReceipt, LedgerDelta, LedgerKey, StockTransfer, StockTransferItem, TransferAction,
    TransferDocuments, TransferStatus, TransferTotals,
};
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

/// A delivered transfer with one item per expected quantity
fn delivered_transfer(expected: &[Decimal]) -> StockTransfer {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let items: Vec<StockTransferItem> = expected
        .iter()
        .map(|qty| StockTransferItem {
            id: Uuid::new_v4(),
            transfer_id: id,
            product_id: Uuid::new_v4(),
            batch_id: None,
            expected_quantity: *qty,
            received_quantity: None,
            condition: ItemCondition::Good,
            notes: None,
            completion_state: CompletionState::Pending,
            received_at: None,
        })
        .collect();

    let mut transfer = StockTransfer {
        id,
        transfer_number: "TRF-20260301-0042".to_string(),
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
    };
    transfer.mark_dispatched(now).unwrap();
    transfer.mark_delivered(None, vec![], now).unwrap();
    transfer
}

fn receiver(transfer: &StockTransfer) -> AccessContext {
    AccessContext::new(Uuid::new_v4(), transfer.to_branch_id, false)
}

fn receipt(item: &StockTransferItem, qty: Decimal, condition: ItemCondition) -> ItemReceipt {
    ItemReceipt {
        item_id: item.id,
        quantity_received: qty,
        condition,
        notes: None,
    }
}

fn exact_receipts(transfer: &StockTransfer) -> Vec<ItemReceipt> {
    transfer
        .items
        .iter()
        .map(|i| receipt(i, i.expected_quantity, ItemCondition::Good))
        .collect()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Generate positive quantities with up to three decimal places
fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|n| Decimal::new(n, 3))
}

fn condition_strategy() -> impl Strategy<Value = ItemCondition> {
    prop_oneof![
        Just(ItemCondition::Good),
        Just(ItemCondition::Damaged),
        Just(ItemCondition::Expired),
        Just(ItemCondition::Partial),
    ]
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_partial_receipt_keeps_transfer_delivered() {
        let mut transfer = delivered_transfer(&[Decimal::from(10), Decimal::from(5)]);
        let ctx = receiver(&transfer);
        let mut ledger = InventoryLedger::new();
        let receipts = vec![
            receipt(&transfer.items[0], Decimal::from(10), ItemCondition::Good),
            receipt(&transfer.items[1], Decimal::from(3), ItemCondition::Good),
        ];

        transfer
            .confirm_receipt(&receipts, &ctx, &mut ledger, Some("short by two".into()), Utc::now())
            .unwrap();

        assert_eq!(transfer.status, TransferStatus::Delivered);
        assert_eq!(transfer.items[0].completion_state, CompletionState::Complete);
        assert_eq!(transfer.items[1].completion_state, CompletionState::Partial);
        assert_eq!(transfer.totals.total_received, Decimal::from(13));
        assert_eq!(transfer.confirmed_date, None);
        assert_eq!(transfer.receipt_notes.as_deref(), Some("short by two"));
        assert_eq!(
            ledger.current_stock(transfer.to_branch_id, transfer.items[1].product_id),
            Decimal::from(3)
        );
    }

    #[test]
    fn test_exact_receipt_confirms_transfer() {
        let mut transfer = delivered_transfer(&[Decimal::from(4), Decimal::from(6)]);
        let ctx = receiver(&transfer);
        let mut ledger = InventoryLedger::new();
        let receipts = exact_receipts(&transfer);

        transfer
            .confirm_receipt(&receipts, &ctx, &mut ledger, None, Utc::now())
            .unwrap();

        assert_eq!(transfer.status, TransferStatus::Confirmed);
        assert_eq!(transfer.confirmed_by, Some(ctx.user_id));
        assert!(transfer.confirmed_date.is_some());
        assert!(!transfer.has_discrepancies());
    }

    #[test]
    fn test_damaged_goods_still_increment_stock() {
        let mut transfer = delivered_transfer(&[Decimal::from(8)]);
        let ctx = receiver(&transfer);
        let mut ledger = InventoryLedger::new();
        let receipts = vec![receipt(&transfer.items[0], Decimal::from(8), ItemCondition::Damaged)];

        transfer
            .confirm_receipt(&receipts, &ctx, &mut ledger, None, Utc::now())
            .unwrap();

        assert_eq!(transfer.items[0].completion_state, CompletionState::Discrepant);
        assert_eq!(transfer.totals.total_damaged, Decimal::from(8));
        assert_eq!(transfer.totals.total_usable, Decimal::ZERO);
        assert_eq!(
            ledger.current_stock(transfer.to_branch_id, transfer.items[0].product_id),
            Decimal::from(8)
        );
    }

    #[test]
    fn test_zero_quantity_produces_no_ledger_delta() {
        let transfer = delivered_transfer(&[Decimal::from(8)]);
        let plan = transfer
            .plan_receipt(&[receipt(&transfer.items[0], Decimal::ZERO, ItemCondition::Good)])
            .unwrap();
        assert!(plan.ledger_deltas.is_empty());
        assert_eq!(plan.item_updates[0].completion_state, CompletionState::Partial);
    }

    #[test]
    fn test_partial_receipt_across_two_confirmations() {
        let mut transfer = delivered_transfer(&[Decimal::from(10), Decimal::from(5)]);
        let ctx = receiver(&transfer);
        let mut ledger = InventoryLedger::new();

        let first = vec![receipt(&transfer.items[0], Decimal::from(10), ItemCondition::Good)];
        transfer
            .confirm_receipt(&first, &ctx, &mut ledger, None, Utc::now())
            .unwrap();

        assert_eq!(transfer.items[0].completion_state, CompletionState::Complete);
        assert_eq!(transfer.items[1].completion_state, CompletionState::Pending);
        assert_eq!(transfer.status, TransferStatus::Delivered);

        let second = vec![receipt(&transfer.items[1], Decimal::from(3), ItemCondition::Partial)];
        transfer
            .confirm_receipt(&second, &ctx, &mut ledger, None, Utc::now())
            .unwrap();

        assert_eq!(transfer.items[1].completion_state, CompletionState::Partial);
        assert_eq!(transfer.status, TransferStatus::Delivered);
        assert_eq!(transfer.totals.total_received, Decimal::from(13));
        assert_eq!(
            ledger.current_stock(transfer.to_branch_id, transfer.items[0].product_id),
            Decimal::from(10)
        );
        assert_eq!(
            ledger.current_stock(transfer.to_branch_id, transfer.items[1].product_id),
            Decimal::from(3)
        );

        // Every item is in, so the shortfall can be closed out explicitly
        transfer
            .finalize_with_discrepancies(ctx.user_id, Utc::now())
            .unwrap();
        assert_eq!(transfer.status, TransferStatus::Confirmed);
    }

    #[test]
    fn test_transfer_view_limited_to_receiving_branch() {
        let transfer = delivered_transfer(&[Decimal::from(2)]);
        let origin = AccessContext::new(Uuid::new_v4(), transfer.from_branch_id, false);
        let admin = AccessContext::new(Uuid::new_v4(), Uuid::new_v4(), true);

        assert!(matches!(
            transfer.authorize(&origin, TransferAction::View),
            Err(DomainError::AccessDenied(_))
        ));
        assert!(transfer.authorize(&receiver(&transfer), TransferAction::View).is_ok());
        assert!(transfer.authorize(&admin, TransferAction::View).is_ok());
    }

    #[test]
    fn test_origin_branch_cannot_confirm() {
        let mut transfer = delivered_transfer(&[Decimal::from(1)]);
        let origin = AccessContext::new(Uuid::new_v4(), transfer.from_branch_id, false);
        let receipts = exact_receipts(&transfer);

        let err = transfer
            .confirm_receipt(&receipts, &origin, &mut InventoryLedger::new(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::AccessDenied(_)));
        assert!(transfer.authorize(&origin, TransferAction::Dispatch).is_ok());
    }

    #[test]
    fn test_confirmation_requires_delivered_status() {
        let mut transfer = delivered_transfer(&[Decimal::from(1)]);
        transfer.status = TransferStatus::Dispatched;
        let ctx = receiver(&transfer);
        let receipts = exact_receipts(&transfer);

        let err = transfer
            .confirm_receipt(&receipts, &ctx, &mut InventoryLedger::new(), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn test_duplicate_item_in_payload_is_rejected() {
        let transfer = delivered_transfer(&[Decimal::from(5)]);
        let line = receipt(&transfer.items[0], Decimal::from(2), ItemCondition::Good);

        let err = transfer.plan_receipt(&[line.clone(), line]).unwrap_err();
        match err {
            DomainError::Validation(violations) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "items[1].itemId");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lock_order_is_sorted_and_distinct() {
        let branch = Uuid::new_v4();
        let a = LedgerKey::new(branch, Uuid::new_v4());
        let b = LedgerKey::new(branch, Uuid::new_v4());
        let deltas: Vec<LedgerDelta> = [b, a, b]
            .iter()
            .map(|key| LedgerDelta {
                key: *key,
                item_id: Uuid::new_v4(),
                quantity: Decimal::ONE,
            })
            .collect();

        let order = lock_order(&deltas);
        assert_eq!(order.len(), 2);
        assert!(order[0] < order[1]);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A failing ledger update leaves ledger and transfer untouched
        #[test]
        fn prop_confirmation_is_atomic(
            expected in prop::collection::vec(quantity_strategy(), 1..8),
            received in prop::collection::vec(quantity_strategy(), 8),
            poisoned in any::<prop::sample::Index>(),
        ) {
            let mut transfer = delivered_transfer(&expected);
            let ctx = receiver(&transfer);
            let poisoned_item = transfer.items[poisoned.index(transfer.items.len())].clone();

            let mut ledger = InventoryLedger::new();
            ledger.set_stock(transfer.to_branch_id, poisoned_item.product_id, Decimal::MAX);
            let ledger_before = ledger.clone();
            let transfer_before = transfer.clone();

            let receipts: Vec<ItemReceipt> = transfer
                .items
                .iter()
                .zip(received.iter())
                .map(|(item, qty)| receipt(item, *qty, ItemCondition::Good))
                .collect();

            let err = transfer
                .confirm_receipt(&receipts, &ctx, &mut ledger, None, Utc::now())
                .unwrap_err();

            match err {
                DomainError::TransferConfirmation { item_id, .. } => {
                    prop_assert_eq!(item_id, poisoned_item.id);
                }
                other => prop_assert!(false, "unexpected error {:?}", other),
            }
            prop_assert_eq!(&ledger, &ledger_before);
            prop_assert_eq!(&transfer, &transfer_before);
        }

        /// An item is applied at most once
        #[test]
        fn prop_no_double_application(
            expected in prop::collection::vec(quantity_strategy(), 2..6),
            first_qty in quantity_strategy(),
            second_qty in quantity_strategy(),
        ) {
            let mut transfer = delivered_transfer(&expected);
            let ctx = receiver(&transfer);
            let mut ledger = InventoryLedger::new();
            let first = transfer.items[0].clone();

            transfer
                .confirm_receipt(
                    &[receipt(&first, first_qty, ItemCondition::Good)],
                    &ctx,
                    &mut ledger,
                    None,
                    Utc::now(),
                )
                .unwrap();
            let ledger_after_first = ledger.clone();

            let err = transfer
                .confirm_receipt(
                    &[receipt(&first, second_qty, ItemCondition::Good)],
                    &ctx,
                    &mut ledger,
                    None,
                    Utc::now(),
                )
                .unwrap_err();

            prop_assert!(matches!(err, DomainError::InvalidState(_)));
            prop_assert_eq!(&ledger, &ledger_after_first);
            prop_assert_eq!(
                ledger_after_first.current_stock(transfer.to_branch_id, first.product_id),
                first_qty
            );
        }

        /// Status reaches confirmed exactly when every item is complete
        #[test]
        fn prop_confirmed_only_when_all_complete(
            lines in prop::collection::vec(
                (quantity_strategy(), quantity_strategy(), condition_strategy()),
                1..8
            ),
        ) {
            let expected: Vec<Decimal> = lines.iter().map(|(e, _, _)| *e).collect();
            let mut transfer = delivered_transfer(&expected);
            let ctx = receiver(&transfer);
            let receipts: Vec<ItemReceipt> = transfer
                .items
                .iter()
                .zip(lines.iter())
                .map(|(item, (_, qty, condition))| receipt(item, *qty, *condition))
                .collect();

            let plan = transfer
                .confirm_receipt(&receipts, &ctx, &mut InventoryLedger::new(), None, Utc::now())
                .unwrap();

            let all_complete = transfer
                .items
                .iter()
                .all(|i| i.completion_state == CompletionState::Complete);
            prop_assert_eq!(transfer.status == TransferStatus::Confirmed, all_complete);
            prop_assert_eq!(plan.completes_transfer(), all_complete);
            prop_assert_eq!(transfer.confirmed_by.is_some(), all_complete);
        }

        /// Ledger grows by exactly the received quantity per product
        #[test]
        fn prop_ledger_increments_match_receipts(
            expected in prop::collection::vec(quantity_strategy(), 1..8),
        ) {
            let mut transfer = delivered_transfer(&expected);
            let ctx = receiver(&transfer);
            let mut ledger = InventoryLedger::new();
            let receipts = exact_receipts(&transfer);

            transfer
                .confirm_receipt(&receipts, &ctx, &mut ledger, None, Utc::now())
                .unwrap();

            for item in &transfer.items {
                prop_assert_eq!(
                    ledger.current_stock(transfer.to_branch_id, item.product_id),
                    item.expected_quantity
                );
                prop_assert_eq!(
                    ledger.current_stock(transfer.from_branch_id, item.product_id),
                    Decimal::ZERO
                );
            }
        }

        /// Serializing and deserializing a transfer reproduces its totals
        #[test]
        fn prop_totals_survive_round_trip(
            lines in prop::collection::vec(
                (quantity_strategy(), quantity_strategy(), condition_strategy()),
                1..6
            ),
        ) {
            let expected: Vec<Decimal> = lines.iter().map(|(e, _, _)| *e).collect();
            let mut transfer = delivered_transfer(&expected);
            let ctx = receiver(&transfer);
            let receipts: Vec<ItemReceipt> = transfer
                .items
                .iter()
                .zip(lines.iter())
                .map(|(item, (_, qty, condition))| receipt(item, *qty, *condition))
                .collect();
            transfer
                .confirm_receipt(&receipts, &ctx, &mut InventoryLedger::new(), None, Utc::now())
                .unwrap();

            let json = serde_json::to_string(&transfer).unwrap();
            let decoded: StockTransfer = serde_json::from_str(&json).unwrap();

            prop_assert_eq!(decoded.totals, transfer.totals);
            prop_assert_eq!(TransferTotals::from_items(&decoded.items), decoded.totals);
            prop_assert_eq!(
                decoded.totals.total_usable,
                decoded.totals.total_received
                    - decoded.totals.total_damaged
                    - decoded.totals.total_spoiled
            );
        }
    }
}
