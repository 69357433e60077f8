//! Discrepancy query service
//!
//! Status writes are optimistic: every update is guarded by the status the
//! change was computed from, and a lost race surfaces as a conflict.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    impact_amount_violation, total_financial_impact, validate_impact_amount, AccessContext,
    AddResponseInput, AssignQueryInput, CloseQueryInput, CreateQueryInput, DocumentKind,
    DomainError, FieldViolation, FinancialImpact, ImpactCategory, PaginatedResponse, Pagination,
    QueryPriority, QueryResponse, QueryStatus, QueryType, RecordImpactInput, ResolveQueryInput,
    StockTransferQuery, StoredFile, TransferAction, TransferStatus,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::sequence::next_document_number;
use super::transfer::fetch_transfer;
use crate::error::{AppError, AppResult};

/// Query service for discrepancy tickets
#[derive(Clone)]
pub struct QueryService {
    db: PgPool,
}

const QUERY_COLUMNS: &str = r#"
    id, query_number, stock_transfer_id, stock_transfer_item_id, branch_id, query_type,
    priority, title, description, expected_quantity, actual_quantity, status, raised_by,
    assigned_to, evidence, resolution_notes, close_reason, created_at, resolved_at,
    closed_at, updated_at
"#;

/// Row for query header queries
#[derive(Debug, FromRow)]
struct QueryRow {
    id: Uuid,
    query_number: String,
    stock_transfer_id: Uuid,
    stock_transfer_item_id: Option<Uuid>,
    branch_id: Uuid,
    query_type: String,
    priority: String,
    title: String,
    description: String,
    expected_quantity: Option<Decimal>,
    actual_quantity: Option<Decimal>,
    status: String,
    raised_by: Uuid,
    assigned_to: Option<Uuid>,
    evidence: Json<Vec<StoredFile>>,
    resolution_notes: Option<String>,
    close_reason: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl QueryRow {
    fn into_query(self) -> AppResult<StockTransferQuery> {
        let query_type = QueryType::from_str(&self.query_type)
            .ok_or_else(|| AppError::Internal(format!("unknown query type {}", self.query_type)))?;
        let priority = QueryPriority::from_str(&self.priority)
            .ok_or_else(|| AppError::Internal(format!("unknown query priority {}", self.priority)))?;
        let status = QueryStatus::from_str(&self.status)
            .ok_or_else(|| AppError::Internal(format!("unknown query status {}", self.status)))?;

        Ok(StockTransferQuery {
            id: self.id,
            query_number: self.query_number,
            stock_transfer_id: self.stock_transfer_id,
            stock_transfer_item_id: self.stock_transfer_item_id,
            branch_id: self.branch_id,
            query_type,
            priority,
            title: self.title,
            description: self.description,
            expected_quantity: self.expected_quantity,
            actual_quantity: self.actual_quantity,
            status,
            raised_by: self.raised_by,
            assigned_to: self.assigned_to,
            evidence: self.evidence.0,
            resolution_notes: self.resolution_notes,
            close_reason: self.close_reason,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            closed_at: self.closed_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row for financial impact queries
#[derive(Debug, FromRow)]
struct ImpactRow {
    id: Uuid,
    query_id: Uuid,
    amount: Decimal,
    category: String,
    description: Option<String>,
    recorded_by: Uuid,
    created_at: DateTime<Utc>,
}

impl ImpactRow {
    fn into_impact(self) -> AppResult<FinancialImpact> {
        let category = ImpactCategory::from_str(&self.category).ok_or_else(|| {
            AppError::Internal(format!("unknown impact category {}", self.category))
        })?;
        Ok(FinancialImpact {
            id: self.id,
            query_id: self.query_id,
            amount: self.amount,
            category,
            description: self.description,
            recorded_by: self.recorded_by,
            created_at: self.created_at,
        })
    }
}

/// Listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryFilters {
    pub status: Option<QueryStatus>,
    pub priority: Option<QueryPriority>,
}

/// Query with its thread and money records
#[derive(Debug, Clone, Serialize)]
pub struct QueryDetail {
    #[serde(flatten)]
    pub query: StockTransferQuery,
    pub responses: Vec<QueryResponse>,
    pub financial_impacts: Vec<FinancialImpact>,
    pub total_financial_impact: Decimal,
}

impl QueryService {
    /// Create a new QueryService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List queries visible to the caller
    pub async fn list(
        &self,
        ctx: &AccessContext,
        filters: &QueryFilters,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockTransferQuery>> {
        let scope = ctx.branch_scope();
        let status = filters.status.map(|s| s.as_str());
        let priority = filters.priority.map(|p| p.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM stock_transfer_queries
            WHERE ($1::uuid IS NULL OR branch_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR priority = $3)
            "#,
        )
        .bind(scope)
        .bind(status)
        .bind(priority)
        .fetch_one(&self.db)
        .await?;

        let queries = sqlx::query_as::<_, QueryRow>(&format!(
            r#"
            SELECT {} FROM stock_transfer_queries
            WHERE ($1::uuid IS NULL OR branch_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR priority = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            QUERY_COLUMNS
        ))
        .bind(scope)
        .bind(status)
        .bind(priority)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(QueryRow::into_query)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(queries, pagination, total as u64))
    }

    /// Query detail with responses and financial impacts
    pub async fn get(&self, ctx: &AccessContext, query_id: Uuid) -> AppResult<QueryDetail> {
        let mut conn = self.db.acquire().await?;
        let query = fetch_query(&mut conn, query_id).await?;
        query.ensure_visible(ctx)?;

        // Internal responses are for admins and the receiving branch, which is
        // exactly who passes `ensure_visible`, so the whole thread is returned.
        let responses = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, Json<Vec<StoredFile>>, bool, DateTime<Utc>)>(
            r#"
            SELECT id, query_id, author_id, message, attachments, is_internal, created_at
            FROM query_responses
            WHERE query_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(query_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|r| QueryResponse {
            id: r.0,
            query_id: r.1,
            author_id: r.2,
            message: r.3,
            attachments: r.4 .0,
            is_internal: r.5,
            created_at: r.6,
        })
        .collect();

        let financial_impacts = sqlx::query_as::<_, ImpactRow>(
            r#"
            SELECT id, query_id, amount, category, description, recorded_by, created_at
            FROM query_financial_impacts
            WHERE query_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(query_id)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(ImpactRow::into_impact)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(QueryDetail {
            total_financial_impact: total_financial_impact(&financial_impacts),
            query,
            responses,
            financial_impacts,
        })
    }

    /// Raise a query against a delivered or confirmed transfer
    pub async fn create(
        &self,
        ctx: &AccessContext,
        input: CreateQueryInput,
    ) -> AppResult<StockTransferQuery> {
        input.check()?;

        let mut tx = self.db.begin().await?;
        let transfer = fetch_transfer(&mut tx, input.stock_transfer_id, false).await?;
        transfer.authorize(ctx, TransferAction::View)?;

        if !matches!(
            transfer.status,
            TransferStatus::Delivered | TransferStatus::Confirmed
        ) {
            return Err(AppError::InvalidState(format!(
                "queries can only be raised on delivered or confirmed transfers, {} is {}",
                transfer.transfer_number, transfer.status
            )));
        }
        if let Some(item_id) = input.stock_transfer_item_id {
            if transfer.item(item_id).is_none() {
                return Err(DomainError::invalid(
                    "stockTransferItemId",
                    "item does not belong to this transfer",
                )
                .into());
            }
        }

        let now = Utc::now();
        let query_number =
            next_document_number(&mut tx, DocumentKind::Query, now.date_naive()).await?;

        let row = sqlx::query_as::<_, QueryRow>(&format!(
            r#"
            INSERT INTO stock_transfer_queries (
                query_number, stock_transfer_id, stock_transfer_item_id, branch_id, query_type,
                priority, title, description, expected_quantity, actual_quantity, status,
                raised_by, evidence, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'open', $11, $12, $13, $13)
            RETURNING {}
            "#,
            QUERY_COLUMNS
        ))
        .bind(&query_number)
        .bind(transfer.id)
        .bind(input.stock_transfer_item_id)
        .bind(transfer.to_branch_id)
        .bind(input.query_type.as_str())
        .bind(input.priority.as_str())
        .bind(input.title.trim())
        .bind(input.description.trim())
        .bind(input.expected_quantity)
        .bind(input.actual_quantity)
        .bind(ctx.user_id)
        .bind(Json(input.evidence))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let query = row.into_query()?;
        tracing::info!(
            query_id = %query.id,
            query_number = %query.query_number,
            transfer_id = %query.stock_transfer_id,
            priority = query.priority.as_str(),
            "query raised"
        );
        Ok(query)
    }

    /// Append to the thread; the first response starts work on an open query
    pub async fn add_response(
        &self,
        ctx: &AccessContext,
        query_id: Uuid,
        input: AddResponseInput,
    ) -> AppResult<QueryResponse> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let mut query = fetch_query(&mut tx, query_id).await?;
        query.ensure_visible(ctx)?;

        let now = Utc::now();
        let response = QueryResponse {
            id: Uuid::new_v4(),
            query_id,
            author_id: ctx.user_id,
            message: input.message.trim().to_string(),
            attachments: input.attachments,
            is_internal: input.is_internal,
            created_at: now,
        };

        let previous = query.status;
        query.add_response(&response, now).map_err(|e| rejected(&query, e))?;

        sqlx::query(
            r#"
            INSERT INTO query_responses
                (id, query_id, author_id, message, attachments, is_internal, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(response.id)
        .bind(query_id)
        .bind(response.author_id)
        .bind(&response.message)
        .bind(Json(response.attachments.clone()))
        .bind(response.is_internal)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        persist_query(&mut tx, &query, previous).await?;
        tx.commit().await?;

        if previous != query.status {
            tracing::info!(query_id = %query_id, from = %previous, to = %query.status, "query status changed");
        }
        Ok(response)
    }

    /// Set the assignee; status is unchanged
    pub async fn assign(
        &self,
        ctx: &AccessContext,
        query_id: Uuid,
        input: AssignQueryInput,
    ) -> AppResult<StockTransferQuery> {
        self.update(ctx, query_id, |q, now| q.assign(input.assignee_id, now))
            .await
    }

    /// Resolve an in-progress query, recording any financial impacts with it
    pub async fn resolve(
        &self,
        ctx: &AccessContext,
        query_id: Uuid,
        input: ResolveQueryInput,
    ) -> AppResult<StockTransferQuery> {
        let violations: Vec<FieldViolation> = input
            .financial_impacts
            .iter()
            .enumerate()
            .filter_map(|(idx, impact)| {
                impact_amount_violation(&format!("financialImpacts[{}].amount", idx), impact.amount)
            })
            .collect();
        DomainError::check(violations)?;

        let mut tx = self.db.begin().await?;
        let mut query = fetch_query(&mut tx, query_id).await?;
        query.ensure_visible(ctx)?;

        let previous = query.status;
        let now = Utc::now();
        query
            .resolve(&input.resolution_note, now)
            .map_err(|e| rejected(&query, e))?;
        persist_query(&mut tx, &query, previous).await?;

        for impact in &input.financial_impacts {
            insert_impact(&mut tx, query_id, impact, ctx.user_id, now).await?;
        }
        tx.commit().await?;

        tracing::info!(
            query_id = %query_id,
            impacts = input.financial_impacts.len(),
            "query resolved"
        );
        Ok(query)
    }

    /// Close a resolved query, or an unresolved one with a reason
    pub async fn close(
        &self,
        ctx: &AccessContext,
        query_id: Uuid,
        input: CloseQueryInput,
    ) -> AppResult<StockTransferQuery> {
        self.update(ctx, query_id, |q, now| q.close(input.reason.as_deref(), now))
            .await
    }

    /// Append a financial impact; rejected once the query is closed
    pub async fn record_financial_impact(
        &self,
        ctx: &AccessContext,
        query_id: Uuid,
        input: RecordImpactInput,
    ) -> AppResult<FinancialImpact> {
        validate_impact_amount(input.amount)?;

        let mut tx = self.db.begin().await?;
        let query = fetch_query(&mut tx, query_id).await?;
        query.ensure_visible(ctx)?;
        query
            .ensure_accepts_financial_impact()
            .map_err(|e| rejected(&query, e))?;

        let impact = insert_impact(&mut tx, query_id, &input, ctx.user_id, Utc::now()).await?;
        tx.commit().await?;

        tracing::info!(query_id = %query_id, amount = %impact.amount, category = impact.category.as_str(), "financial impact recorded");
        Ok(impact)
    }

    /// Load, check visibility, apply a lifecycle step and persist it
    async fn update<F>(&self, ctx: &AccessContext, query_id: Uuid, step: F) -> AppResult<StockTransferQuery>
    where
        F: FnOnce(&mut StockTransferQuery, DateTime<Utc>) -> Result<(), DomainError>,
    {
        let mut conn = self.db.acquire().await?;
        let mut query = fetch_query(&mut conn, query_id).await?;
        query.ensure_visible(ctx)?;

        let previous = query.status;
        step(&mut query, Utc::now()).map_err(|e| rejected(&query, e))?;
        persist_query(&mut conn, &query, previous).await?;

        if previous != query.status {
            tracing::info!(query_id = %query_id, from = %previous, to = %query.status, "query status changed");
        }
        Ok(query)
    }
}

fn rejected(query: &StockTransferQuery, err: DomainError) -> AppError {
    tracing::warn!(
        query_id = %query.id,
        status = %query.status,
        "query operation rejected: {}",
        err
    );
    err.into()
}

async fn fetch_query(conn: &mut PgConnection, query_id: Uuid) -> AppResult<StockTransferQuery> {
    sqlx::query_as::<_, QueryRow>(&format!(
        "SELECT {} FROM stock_transfer_queries WHERE id = $1",
        QUERY_COLUMNS
    ))
    .bind(query_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Query".to_string()))?
    .into_query()
}

/// Optimistic write of every mutable field
async fn persist_query(
    conn: &mut PgConnection,
    query: &StockTransferQuery,
    expected_status: QueryStatus,
) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_transfer_queries
        SET status = $3, assigned_to = $4, resolution_notes = $5, close_reason = $6,
            resolved_at = $7, closed_at = $8, updated_at = $9
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(query.id)
    .bind(expected_status.as_str())
    .bind(query.status.as_str())
    .bind(query.assigned_to)
    .bind(&query.resolution_notes)
    .bind(&query.close_reason)
    .bind(query.resolved_at)
    .bind(query.closed_at)
    .bind(query.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() != 1 {
        return Err(AppError::ConcurrentModification(format!(
            "Query {}",
            query.query_number
        )));
    }
    Ok(())
}

/// Insert an impact only while the query is still open for it
async fn insert_impact(
    conn: &mut PgConnection,
    query_id: Uuid,
    input: &RecordImpactInput,
    recorded_by: Uuid,
    now: DateTime<Utc>,
) -> AppResult<FinancialImpact> {
    let row = sqlx::query_as::<_, ImpactRow>(
        r#"
        INSERT INTO query_financial_impacts
            (query_id, amount, category, description, recorded_by, created_at)
        SELECT $1, $2, $3, $4, $5, $6
        WHERE EXISTS (
            SELECT 1 FROM stock_transfer_queries WHERE id = $1 AND status <> 'closed'
        )
        RETURNING id, query_id, amount, category, description, recorded_by, created_at
        "#,
    )
    .bind(query_id)
    .bind(input.amount)
    .bind(input.category.as_str())
    .bind(&input.description)
    .bind(recorded_by)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::ConcurrentModification(format!("Query {}", query_id)))?;

    row.into_impact()
}
