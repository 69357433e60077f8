//! Branch statistics and stock handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use shared::Period;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::ledger::StockLevel;
use crate::services::{LedgerService, StatisticsService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    #[serde(default)]
    pub period: Period,
    pub format: Option<String>, // "json" or "csv"
}

/// Get KPIs for a receiving branch
pub async fn get_branch_statistics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(branch_id): Path<Uuid>,
    Query(query): Query<StatisticsQuery>,
) -> AppResult<impl IntoResponse> {
    let service = StatisticsService::new(state.db.clone());
    let stats = service
        .branch_statistics(&user.access(), branch_id, query.period)
        .await?;

    if query.format.as_deref() == Some("csv") {
        let csv = StatisticsService::export_to_csv(&stats.trend)?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"branch_trend.csv\""),
            ],
            csv,
        )
            .into_response())
    } else {
        Ok(Json(stats).into_response())
    }
}

/// Get current stock for a branch
pub async fn get_branch_stock(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(branch_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockLevel>>> {
    let service = LedgerService::new(state.db.clone());
    let stock = service.branch_stock(&user.access(), branch_id).await?;
    Ok(Json(stock))
}
