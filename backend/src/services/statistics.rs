//! Branch statistics: transfer and query KPIs, quality score and trend

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    average_resolution_hours, build_trend, percentage, quality_score, AccessContext,
    BranchStatistics, DateRange, Period, QueryPriority, QueryStatistics, QueryStatus,
    TransferStatistics, TransferStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Statistics service; read-only over transfers and queries
#[derive(Clone)]
pub struct StatisticsService {
    db: PgPool,
}

impl StatisticsService {
    /// Create a new StatisticsService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// KPIs for `branch_id` as receiving branch over the period ending today
    pub async fn branch_statistics(
        &self,
        ctx: &AccessContext,
        branch_id: Uuid,
        period: Period,
    ) -> AppResult<BranchStatistics> {
        ctx.require(branch_id, "view statistics")?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM branches WHERE id = $1)")
            .bind(branch_id)
            .fetch_one(&self.db)
            .await?;
        if !exists {
            return Err(AppError::NotFound("Branch".to_string()));
        }

        let range = period.range_ending(Utc::now().date_naive());
        let transfers = self.transfer_statistics(branch_id, &range).await?;
        let queries = self.query_statistics(branch_id, &range).await?;

        let transfer_days = self.daily_counts("stock_transfers", "to_branch_id", branch_id, &range).await?;
        let query_days = self.daily_counts("stock_transfer_queries", "branch_id", branch_id, &range).await?;

        Ok(BranchStatistics {
            quality_score: quality_score(queries.total, transfers.total),
            trend: build_trend(&range, &transfer_days, &query_days),
            range,
            transfers,
            queries,
        })
    }

    async fn transfer_statistics(
        &self,
        branch_id: Uuid,
        range: &DateRange,
    ) -> AppResult<TransferStatistics> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM stock_transfers
            WHERE to_branch_id = $1 AND created_at >= $2 AND created_at < $3
            GROUP BY status
            "#,
        )
        .bind(branch_id)
        .bind(range.start_at())
        .bind(range.end_exclusive_at())
        .fetch_all(&self.db)
        .await?;

        let (total_expected, total_received) = sqlx::query_as::<_, (Decimal, Decimal)>(
            r#"
            SELECT COALESCE(SUM(total_expected), 0), COALESCE(SUM(total_received), 0)
            FROM stock_transfers
            WHERE to_branch_id = $1 AND created_at >= $2 AND created_at < $3
              AND status <> 'cancelled'
            "#,
        )
        .bind(branch_id)
        .bind(range.start_at())
        .bind(range.end_exclusive_at())
        .fetch_one(&self.db)
        .await?;

        let mut by_status: BTreeMap<String, i64> = TransferStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        by_status.extend(counts);

        let total: i64 = by_status.values().sum();
        let confirmed = by_status
            .get(TransferStatus::Confirmed.as_str())
            .copied()
            .unwrap_or(0);

        Ok(TransferStatistics {
            total,
            receipt_efficiency: percentage(confirmed, total),
            by_status,
            total_expected,
            total_received,
        })
    }

    async fn query_statistics(
        &self,
        branch_id: Uuid,
        range: &DateRange,
    ) -> AppResult<QueryStatistics> {
        let rows = sqlx::query_as::<_, (String, String, Option<i64>)>(
            r#"
            SELECT status, priority,
                   EXTRACT(EPOCH FROM (resolved_at - created_at))::BIGINT
            FROM stock_transfer_queries
            WHERE branch_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(branch_id)
        .bind(range.start_at())
        .bind(range.end_exclusive_at())
        .fetch_all(&self.db)
        .await?;

        let total_financial_impact: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(fi.amount), 0)
            FROM query_financial_impacts fi
            JOIN stock_transfer_queries q ON q.id = fi.query_id
            WHERE q.branch_id = $1 AND q.created_at >= $2 AND q.created_at < $3
            "#,
        )
        .bind(branch_id)
        .bind(range.start_at())
        .bind(range.end_exclusive_at())
        .fetch_one(&self.db)
        .await?;

        let mut by_status: BTreeMap<String, i64> = QueryStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_priority: BTreeMap<String, i64> = QueryPriority::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), 0))
            .collect();
        let mut durations = Vec::new();

        for (status, priority, resolution_secs) in &rows {
            *by_status.entry(status.clone()).or_insert(0) += 1;
            *by_priority.entry(priority.clone()).or_insert(0) += 1;
            if let Some(secs) = resolution_secs {
                durations.push(*secs);
            }
        }

        let total = rows.len() as i64;
        let resolved = durations.len() as i64;

        Ok(QueryStatistics {
            total,
            by_status,
            by_priority,
            resolved,
            resolution_rate: percentage(resolved, total),
            average_resolution_hours: average_resolution_hours(&durations),
            total_financial_impact,
        })
    }

    /// Rows created per UTC day in `range`
    async fn daily_counts(
        &self,
        table: &str,
        branch_column: &str,
        branch_id: Uuid,
        range: &DateRange,
    ) -> AppResult<Vec<(NaiveDate, i64)>> {
        let rows = sqlx::query_as::<_, (NaiveDate, i64)>(&format!(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, COUNT(*)
            FROM {table}
            WHERE {branch_column} = $1 AND created_at >= $2 AND created_at < $3
            GROUP BY day
            ORDER BY day
            "#
        ))
        .bind(branch_id)
        .bind(range.start_at())
        .bind(range.end_exclusive_at())
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Export rows to CSV format
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}
