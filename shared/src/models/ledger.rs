//! Inventory ledger: current stock per branch and product

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Identifies one ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub branch_id: Uuid,
    pub product_id: Uuid,
}

impl LedgerKey {
    pub fn new(branch_id: Uuid, product_id: Uuid) -> Self {
        Self {
            branch_id,
            product_id,
        }
    }
}

/// Stock increment produced by receiving one transfer item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub key: LedgerKey,
    pub item_id: Uuid,
    pub quantity: Decimal,
}

/// Distinct ledger rows touched by `deltas`, in the order they must be locked.
/// Every writer locks in this order so two confirmations cannot deadlock.
pub fn lock_order(deltas: &[LedgerDelta]) -> Vec<LedgerKey> {
    let mut keys: Vec<LedgerKey> = deltas.iter().map(|d| d.key).collect();
    keys.sort();
    keys.dedup();
    keys
}

/// In-memory ledger with all-or-nothing batch application.
///
/// The database-backed ledger in the backend follows the same contract inside
/// a transaction; this type carries the rules for previews and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryLedger {
    rows: BTreeMap<LedgerKey, Decimal>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_stock(&self, branch_id: Uuid, product_id: Uuid) -> Decimal {
        self.rows
            .get(&LedgerKey::new(branch_id, product_id))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn set_stock(&mut self, branch_id: Uuid, product_id: Uuid, quantity: Decimal) {
        self.rows
            .insert(LedgerKey::new(branch_id, product_id), quantity);
    }

    /// Apply every delta or none. The first failing item aborts the batch
    /// and leaves the ledger untouched.
    pub fn apply_all(&mut self, deltas: &[LedgerDelta]) -> DomainResult<()> {
        let mut staged: BTreeMap<LedgerKey, Decimal> = BTreeMap::new();

        for delta in deltas {
            let current = staged
                .get(&delta.key)
                .or_else(|| self.rows.get(&delta.key))
                .copied()
                .unwrap_or(Decimal::ZERO);

            let next = current.checked_add(delta.quantity).ok_or_else(|| {
                DomainError::TransferConfirmation {
                    item_id: delta.item_id,
                    reason: "stock quantity overflow".to_string(),
                }
            })?;

            if next < Decimal::ZERO {
                return Err(DomainError::TransferConfirmation {
                    item_id: delta.item_id,
                    reason: "stock would become negative".to_string(),
                });
            }

            staged.insert(delta.key, next);
        }

        self.rows.extend(staged);
        Ok(())
    }
}
