//! Stock transfer service: lifecycle writes and receipt confirmation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    validate_new_transfer, AccessContext, AddTransferNoteInput, CancelTransferInput,
    CompletionState, ConfirmReceiptInput, CreateTransferInput, DocumentKind, DomainError,
    FieldViolation, ItemCondition, MarkDeliveredInput, PaginatedResponse, Pagination,
    StockTransfer, StockTransferItem, TransferAction, TransferDocuments, TransferNote,
    TransferStatus, TransferTotals,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::ledger::{apply_deltas, MovementReason};
use super::sequence::next_document_number;
use crate::error::{AppError, AppResult};

/// Transfer service for lifecycle and confirmation operations
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
}

const TRANSFER_COLUMNS: &str = r#"
    id, transfer_number, from_branch_id, to_branch_id, initiated_by, status, documents,
    delivery_notes, receipt_notes, cancellation_reason, dispatched_at, delivered_at,
    confirmed_date, confirmed_by, total_expected, total_received, total_damaged,
    total_spoiled, total_usable, created_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, transfer_id, product_id, batch_id, expected_quantity, received_quantity,
    condition, notes, completion_state, received_at
"#;

/// Row for transfer header queries
#[derive(Debug, FromRow)]
struct TransferRow {
    id: Uuid,
    transfer_number: String,
    from_branch_id: Uuid,
    to_branch_id: Uuid,
    initiated_by: Uuid,
    status: String,
    documents: Json<TransferDocuments>,
    delivery_notes: Option<String>,
    receipt_notes: Option<String>,
    cancellation_reason: Option<String>,
    dispatched_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    confirmed_date: Option<DateTime<Utc>>,
    confirmed_by: Option<Uuid>,
    total_expected: Decimal,
    total_received: Decimal,
    total_damaged: Decimal,
    total_spoiled: Decimal,
    total_usable: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row for transfer item queries
#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    transfer_id: Uuid,
    product_id: Uuid,
    batch_id: Option<Uuid>,
    expected_quantity: Decimal,
    received_quantity: Option<Decimal>,
    condition: String,
    notes: Option<String>,
    completion_state: String,
    received_at: Option<DateTime<Utc>>,
}

impl ItemRow {
    fn into_item(self) -> AppResult<StockTransferItem> {
        let condition = ItemCondition::from_str(&self.condition).ok_or_else(|| {
            AppError::Internal(format!("unknown item condition {}", self.condition))
        })?;
        let completion_state = CompletionState::from_str(&self.completion_state).ok_or_else(|| {
            AppError::Internal(format!("unknown completion state {}", self.completion_state))
        })?;
        Ok(StockTransferItem {
            id: self.id,
            transfer_id: self.transfer_id,
            product_id: self.product_id,
            batch_id: self.batch_id,
            expected_quantity: self.expected_quantity,
            received_quantity: self.received_quantity,
            condition,
            notes: self.notes,
            completion_state,
            received_at: self.received_at,
        })
    }
}

impl TransferRow {
    fn into_transfer(self, items: Vec<StockTransferItem>) -> AppResult<StockTransfer> {
        let status = TransferStatus::from_str(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unknown transfer status {}", self.status))
        })?;
        Ok(StockTransfer {
            id: self.id,
            transfer_number: self.transfer_number,
            from_branch_id: self.from_branch_id,
            to_branch_id: self.to_branch_id,
            initiated_by: self.initiated_by,
            status,
            documents: self.documents.0,
            delivery_notes: self.delivery_notes,
            receipt_notes: self.receipt_notes,
            cancellation_reason: self.cancellation_reason,
            dispatched_at: self.dispatched_at,
            delivered_at: self.delivered_at,
            confirmed_date: self.confirmed_date,
            confirmed_by: self.confirmed_by,
            totals: TransferTotals {
                total_expected: self.total_expected,
                total_received: self.total_received,
                total_damaged: self.total_damaged,
                total_spoiled: self.total_spoiled,
                total_usable: self.total_usable,
            },
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Query raised against a transfer, as listed on the transfer detail
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TransferQuerySummary {
    pub id: Uuid,
    pub query_number: String,
    pub stock_transfer_item_id: Option<Uuid>,
    pub query_type: String,
    pub priority: String,
    pub status: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Transfer with its queries and notes
#[derive(Debug, Clone, Serialize)]
pub struct TransferDetail {
    #[serde(flatten)]
    pub transfer: StockTransfer,
    pub completion_percentage: Decimal,
    pub has_discrepancies: bool,
    pub queries: Vec<TransferQuerySummary>,
    pub notes: Vec<TransferNote>,
}

impl TransferService {
    /// Create a new TransferService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List transfers received by the caller's branch (all for admins)
    pub async fn list(
        &self,
        ctx: &AccessContext,
        status: Option<TransferStatus>,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockTransfer>> {
        let scope = ctx.branch_scope();
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_transfers
            WHERE ($1::uuid IS NULL OR to_branch_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(scope)
        .bind(status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, TransferRow>(&format!(
            r#"
            SELECT {} FROM stock_transfers
            WHERE ($1::uuid IS NULL OR to_branch_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            TRANSFER_COLUMNS
        ))
        .bind(scope)
        .bind(status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM stock_transfer_items WHERE transfer_id = ANY($1) ORDER BY line_no",
            ITEM_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(ItemRow::into_item)
        .collect::<AppResult<Vec<_>>>()?;

        let mut transfers = Vec::with_capacity(rows.len());
        for row in rows {
            let (own, rest): (Vec<_>, Vec<_>) =
                items.into_iter().partition(|i| i.transfer_id == row.id);
            items = rest;
            transfers.push(row.into_transfer(own)?);
        }

        Ok(PaginatedResponse::new(transfers, pagination, total as u64))
    }

    /// Transfer detail with items, queries and notes
    pub async fn get(&self, ctx: &AccessContext, transfer_id: Uuid) -> AppResult<TransferDetail> {
        let mut conn = self.db.acquire().await?;
        let transfer = fetch_transfer(&mut conn, transfer_id, false).await?;
        transfer.authorize(ctx, TransferAction::View)?;

        let queries = sqlx::query_as::<_, TransferQuerySummary>(
            r#"
            SELECT id, query_number, stock_transfer_item_id, query_type, priority, status,
                   title, created_at
            FROM stock_transfer_queries
            WHERE stock_transfer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;

        let notes = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, DateTime<Utc>)>(
            r#"
            SELECT id, transfer_id, author_id, message, created_at
            FROM stock_transfer_notes
            WHERE transfer_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|r| TransferNote {
            id: r.0,
            transfer_id: r.1,
            author_id: r.2,
            message: r.3,
            created_at: r.4,
        })
        .collect();

        Ok(TransferDetail {
            completion_percentage: transfer.totals.completion_percentage(),
            has_discrepancies: transfer.has_discrepancies(),
            transfer,
            queries,
            notes,
        })
    }

    /// Create a draft transfer from the caller's branch
    pub async fn create(
        &self,
        ctx: &AccessContext,
        input: CreateTransferInput,
    ) -> AppResult<StockTransfer> {
        let from_branch_id = input.from_branch_id.unwrap_or(ctx.branch_id);
        ctx.require(from_branch_id, "create transfers from this branch")?;
        validate_new_transfer(from_branch_id, &input)?;

        let branches_found: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ANY($1)")
                .bind(vec![from_branch_id, input.to_branch_id])
                .fetch_one(&self.db)
                .await?;
        if branches_found != 2 {
            return Err(AppError::NotFound("Branch".to_string()));
        }

        let product_ids: Vec<Uuid> = input.items.iter().map(|i| i.product_id).collect();
        let known_products: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = ANY($1)")
                .bind(&product_ids)
                .fetch_all(&self.db)
                .await?;
        let unknown: Vec<FieldViolation> = input
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| !known_products.contains(&item.product_id))
            .map(|(idx, item)| {
                FieldViolation::new(
                    format!("items[{}].productId", idx),
                    format!("product {} does not exist", item.product_id),
                )
            })
            .collect();
        DomainError::check(unknown)?;

        let now = Utc::now();
        let total_expected: Decimal = input.items.iter().map(|i| i.expected_quantity).sum();

        let mut tx = self.db.begin().await?;
        let transfer_number =
            next_document_number(&mut tx, DocumentKind::Transfer, now.date_naive()).await?;

        let transfer_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO stock_transfers (
                transfer_number, from_branch_id, to_branch_id, initiated_by, status,
                delivery_notes, total_expected, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7, $7)
            RETURNING id
            "#,
        )
        .bind(&transfer_number)
        .bind(from_branch_id)
        .bind(input.to_branch_id)
        .bind(ctx.user_id)
        .bind(&input.delivery_notes)
        .bind(total_expected)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for (line_no, item) in input.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO stock_transfer_items
                    (transfer_id, line_no, product_id, batch_id, expected_quantity, notes)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(transfer_id)
            .bind(line_no as i32 + 1)
            .bind(item.product_id)
            .bind(item.batch_id)
            .bind(item.expected_quantity)
            .bind(&item.notes)
            .execute(&mut *tx)
            .await?;
        }

        let transfer = fetch_transfer(&mut tx, transfer_id, false).await?;
        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            transfer_number = %transfer.transfer_number,
            items = transfer.items.len(),
            "transfer created"
        );
        Ok(transfer)
    }

    /// Delete a draft and its items
    pub async fn delete_draft(&self, ctx: &AccessContext, transfer_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let transfer = fetch_transfer(&mut tx, transfer_id, true).await?;
        transfer.authorize(ctx, TransferAction::Delete)?;

        if transfer.status != TransferStatus::Draft {
            return Err(AppError::InvalidState(format!(
                "transfer {} is {} and can no longer be deleted",
                transfer.transfer_number, transfer.status
            )));
        }

        sqlx::query("DELETE FROM stock_transfers WHERE id = $1 AND status = 'draft'")
            .bind(transfer_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer_id, "draft transfer deleted");
        Ok(())
    }

    pub async fn dispatch(&self, ctx: &AccessContext, transfer_id: Uuid) -> AppResult<StockTransfer> {
        self.transition(ctx, transfer_id, TransferAction::Dispatch, |t, now| {
            t.mark_dispatched(now)
        })
        .await
    }

    pub async fn deliver(
        &self,
        ctx: &AccessContext,
        transfer_id: Uuid,
        input: MarkDeliveredInput,
    ) -> AppResult<StockTransfer> {
        self.transition(ctx, transfer_id, TransferAction::Deliver, move |t, now| {
            t.mark_delivered(input.notes, input.photos, now)
        })
        .await
    }

    pub async fn cancel(
        &self,
        ctx: &AccessContext,
        transfer_id: Uuid,
        input: CancelTransferInput,
    ) -> AppResult<StockTransfer> {
        self.transition(ctx, transfer_id, TransferAction::Cancel, move |t, now| {
            t.cancel(&input.reason, now)
        })
        .await
    }

    /// Confirm a delivered transfer whose items are all received but carry
    /// discrepancies
    pub async fn finalize(&self, ctx: &AccessContext, transfer_id: Uuid) -> AppResult<StockTransfer> {
        let actor = ctx.user_id;
        self.transition(ctx, transfer_id, TransferAction::Receive, move |t, now| {
            t.finalize_with_discrepancies(actor, now)
        })
        .await
    }

    /// Lock, authorize, run a lifecycle step and persist the header
    async fn transition<F>(
        &self,
        ctx: &AccessContext,
        transfer_id: Uuid,
        action: TransferAction,
        step: F,
    ) -> AppResult<StockTransfer>
    where
        F: FnOnce(&mut StockTransfer, DateTime<Utc>) -> Result<(), DomainError>,
    {
        let mut tx = self.db.begin().await?;
        let mut transfer = fetch_transfer(&mut tx, transfer_id, true).await?;
        transfer.authorize(ctx, action)?;

        let previous = transfer.status;
        if let Err(err) = step(&mut transfer, Utc::now()) {
            tracing::warn!(
                transfer_id = %transfer_id,
                status = %previous,
                action = ?action,
                "transfer transition rejected: {}",
                err
            );
            return Err(err.into());
        }

        persist_header(&mut tx, &transfer, previous).await?;
        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            from = %previous,
            to = %transfer.status,
            "transfer status changed"
        );
        Ok(transfer)
    }

    /// Receipt confirmation: validate, increment the receiving branch's
    /// ledger, record per-item outcomes and totals in one transaction.
    pub async fn confirm_receipt(
        &self,
        ctx: &AccessContext,
        transfer_id: Uuid,
        input: ConfirmReceiptInput,
    ) -> AppResult<StockTransfer> {
        let mut tx = self.db.begin().await?;
        let mut transfer = fetch_transfer(&mut tx, transfer_id, true).await?;
        transfer.authorize(ctx, TransferAction::Receive)?;

        let plan = transfer.plan_receipt(&input.items)?;
        let now = Utc::now();

        apply_deltas(
            &mut tx,
            &plan.ledger_deltas,
            MovementReason::TransferReceipt,
            transfer.id,
            ctx.user_id,
        )
        .await?;

        for update in &plan.item_updates {
            let result = sqlx::query(
                r#"
                UPDATE stock_transfer_items
                SET received_quantity = $3, condition = $4, notes = COALESCE($5, notes),
                    completion_state = $6, received_at = $7
                WHERE id = $1 AND transfer_id = $2 AND received_quantity IS NULL
                "#,
            )
            .bind(update.item_id)
            .bind(transfer.id)
            .bind(update.quantity_received)
            .bind(update.condition.as_str())
            .bind(&update.notes)
            .bind(update.completion_state.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() != 1 {
                return Err(AppError::ConcurrentModification(format!(
                    "Transfer item {}",
                    update.item_id
                )));
            }
        }

        let previous = transfer.status;
        transfer.apply_receipt_plan(&plan, ctx.user_id, input.overall_notes, now);
        persist_header(&mut tx, &transfer, previous).await?;
        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer.id,
            items = plan.item_updates.len(),
            ledger_rows = plan.ledger_deltas.len(),
            status = %transfer.status,
            "receipt confirmed"
        );
        if transfer.has_discrepancies() {
            tracing::warn!(transfer_id = %transfer.id, "receipt recorded with discrepancies");
        }

        Ok(transfer)
    }

    /// Append a note; allowed in every status
    pub async fn add_note(
        &self,
        ctx: &AccessContext,
        transfer_id: Uuid,
        input: AddTransferNoteInput,
    ) -> AppResult<TransferNote> {
        input.check()?;

        let mut conn = self.db.acquire().await?;
        let transfer = fetch_transfer(&mut conn, transfer_id, false).await?;
        transfer.authorize(ctx, TransferAction::AddNote)?;

        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            INSERT INTO stock_transfer_notes (transfer_id, author_id, message)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(transfer_id)
        .bind(ctx.user_id)
        .bind(input.message.trim())
        .fetch_one(&mut *conn)
        .await?;

        Ok(TransferNote {
            id: row.0,
            transfer_id,
            author_id: ctx.user_id,
            message: input.message.trim().to_string(),
            created_at: row.1,
        })
    }
}

/// Load a transfer with its items, optionally locking the header row
pub(crate) async fn fetch_transfer(
    conn: &mut PgConnection,
    transfer_id: Uuid,
    for_update: bool,
) -> AppResult<StockTransfer> {
    let sql = format!(
        "SELECT {} FROM stock_transfers WHERE id = $1{}",
        TRANSFER_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, TransferRow>(&sql)
        .bind(transfer_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Transfer".to_string()))?;

    let items = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {} FROM stock_transfer_items WHERE transfer_id = $1 ORDER BY line_no",
        ITEM_COLUMNS
    ))
    .bind(transfer_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(ItemRow::into_item)
    .collect::<AppResult<Vec<_>>>()?;

    row.into_transfer(items)
}

/// Write every mutable header field, guarded by the status the change was
/// computed from
async fn persist_header(
    conn: &mut PgConnection,
    transfer: &StockTransfer,
    expected_status: TransferStatus,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_transfers
        SET status = $3, documents = $4, delivery_notes = $5, receipt_notes = $6,
            cancellation_reason = $7, dispatched_at = $8, delivered_at = $9,
            confirmed_date = $10, confirmed_by = $11, total_expected = $12,
            total_received = $13, total_damaged = $14, total_spoiled = $15,
            total_usable = $16, updated_at = $17
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(transfer.id)
    .bind(expected_status.as_str())
    .bind(transfer.status.as_str())
    .bind(Json(transfer.documents.clone()))
    .bind(&transfer.delivery_notes)
    .bind(&transfer.receipt_notes)
    .bind(&transfer.cancellation_reason)
    .bind(transfer.dispatched_at)
    .bind(transfer.delivered_at)
    .bind(transfer.confirmed_date)
    .bind(transfer.confirmed_by)
    .bind(transfer.totals.total_expected)
    .bind(transfer.totals.total_received)
    .bind(transfer.totals.total_damaged)
    .bind(transfer.totals.total_spoiled)
    .bind(transfer.totals.total_usable)
    .bind(transfer.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(AppError::ConcurrentModification(format!(
            "Transfer {}",
            transfer.transfer_number
        )));
    }
    Ok(())
}

