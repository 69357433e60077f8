//! Database-backed inventory ledger
//!
//! Increments follow the same all-or-nothing contract as
//! `shared::InventoryLedger`: rows are locked in `lock_order`, the batch is
//! checked in memory, then written. Callers own the transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{lock_order, AccessContext, InventoryLedger, LedgerDelta};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Ledger service for stock lookups
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

/// One ledger row with product details
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockLevel {
    pub branch_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_of_measure: String,
    pub current_stock: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Why stock moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementReason {
    TransferReceipt,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::TransferReceipt => "transfer_receipt",
        }
    }
}

impl LedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Stock rows for a branch
    pub async fn branch_stock(
        &self,
        ctx: &AccessContext,
        branch_id: Uuid,
    ) -> AppResult<Vec<StockLevel>> {
        ctx.require(branch_id, "view stock")?;

        let rows = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT il.branch_id, il.product_id, p.name AS product_name, p.unit_of_measure,
                   il.current_stock, il.updated_at
            FROM inventory_ledger il
            JOIN products p ON p.id = il.product_id
            WHERE il.branch_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(branch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

/// Apply a batch of increments inside the caller's transaction.
///
/// Any failure is reported against the item that caused it; the caller
/// rolls back by dropping the transaction.
pub async fn apply_deltas(
    conn: &mut PgConnection,
    deltas: &[LedgerDelta],
    reason: MovementReason,
    reference_id: Uuid,
    actor: Uuid,
) -> AppResult<()> {
    if deltas.is_empty() {
        return Ok(());
    }

    let mut ledger = InventoryLedger::new();
    for key in lock_order(deltas) {
        sqlx::query(
            r#"
            INSERT INTO inventory_ledger (branch_id, product_id, current_stock)
            VALUES ($1, $2, 0)
            ON CONFLICT (branch_id, product_id) DO NOTHING
            "#,
        )
        .bind(key.branch_id)
        .bind(key.product_id)
        .execute(&mut *conn)
        .await?;

        let current: Decimal = sqlx::query_scalar(
            r#"
            SELECT current_stock FROM inventory_ledger
            WHERE branch_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(key.branch_id)
        .bind(key.product_id)
        .fetch_one(&mut *conn)
        .await?;

        ledger.set_stock(key.branch_id, key.product_id, current);
    }

    ledger.apply_all(deltas)?;

    for delta in deltas {
        let updated = sqlx::query(
            r#"
            UPDATE inventory_ledger
            SET current_stock = current_stock + $3, updated_at = NOW()
            WHERE branch_id = $1 AND product_id = $2
            "#,
        )
        .bind(delta.key.branch_id)
        .bind(delta.key.product_id)
        .bind(delta.quantity)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::TransferConfirmation {
            item_id: delta.item_id,
            reason: format!("ledger update failed: {}", e),
        })?;

        if updated.rows_affected() != 1 {
            return Err(AppError::TransferConfirmation {
                item_id: delta.item_id,
                reason: "ledger row disappeared".to_string(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (branch_id, product_id, quantity, reason, reference_id, reference_item_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(delta.key.branch_id)
        .bind(delta.key.product_id)
        .bind(delta.quantity)
        .bind(reason.as_str())
        .bind(reference_id)
        .bind(delta.item_id)
        .bind(actor)
        .execute(&mut *conn)
        .await?;
    }

    tracing::debug!(reference_id = %reference_id, rows = deltas.len(), "ledger increments applied");
    Ok(())
}
