//! Discrepancy query HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use shared::{
    AddResponseInput, AssignQueryInput, CloseQueryInput, CreateQueryInput, PaginatedResponse,
    Pagination, QueryPriority, QueryStatus, RecordImpactInput, ResolveQueryInput,
    StockTransferQuery,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::query::{QueryDetail, QueryFilters};
use crate::services::QueryService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQueriesQuery {
    pub status: Option<QueryStatus>,
    pub priority: Option<QueryPriority>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// List queries visible to the caller
pub async fn list_queries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQueriesQuery>,
) -> AppResult<Json<PaginatedResponse<StockTransferQuery>>> {
    let service = QueryService::new(state.db.clone());
    let filters = QueryFilters {
        status: query.status,
        priority: query.priority,
    };
    let pagination = Pagination::from_query(query.page, query.limit);
    let queries = service.list(&user.access(), &filters, &pagination).await?;
    Ok(Json(queries))
}

/// Raise a new query
pub async fn create_query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<CreateQueryInput>,
) -> AppResult<impl IntoResponse> {
    state.file_store.verify("evidence", &input.evidence).await?;
    let service = QueryService::new(state.db.clone());
    let query = service.create(&user.access(), input).await?;
    Ok((StatusCode::CREATED, Json(query)))
}

/// Get a query with its responses and financial impacts
pub async fn get_query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(query_id): Path<Uuid>,
) -> AppResult<Json<QueryDetail>> {
    let service = QueryService::new(state.db.clone());
    let detail = service.get(&user.access(), query_id).await?;
    Ok(Json(detail))
}

pub async fn add_query_response(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(query_id): Path<Uuid>,
    Json(input): Json<AddResponseInput>,
) -> AppResult<impl IntoResponse> {
    state.file_store.verify("attachments", &input.attachments).await?;
    let service = QueryService::new(state.db.clone());
    let response = service.add_response(&user.access(), query_id, input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn assign_query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(query_id): Path<Uuid>,
    Json(input): Json<AssignQueryInput>,
) -> AppResult<Json<StockTransferQuery>> {
    let service = QueryService::new(state.db.clone());
    let query = service.assign(&user.access(), query_id, input).await?;
    Ok(Json(query))
}

pub async fn resolve_query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(query_id): Path<Uuid>,
    Json(input): Json<ResolveQueryInput>,
) -> AppResult<Json<StockTransferQuery>> {
    let service = QueryService::new(state.db.clone());
    let query = service.resolve(&user.access(), query_id, input).await?;
    Ok(Json(query))
}

pub async fn close_query(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(query_id): Path<Uuid>,
    Json(input): Json<CloseQueryInput>,
) -> AppResult<Json<StockTransferQuery>> {
    let service = QueryService::new(state.db.clone());
    let query = service.close(&user.access(), query_id, input).await?;
    Ok(Json(query))
}

/// Record money lost to a discrepancy
pub async fn record_financial_impact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(query_id): Path<Uuid>,
    Json(input): Json<RecordImpactInput>,
) -> AppResult<impl IntoResponse> {
    let service = QueryService::new(state.db.clone());
    let impact = service
        .record_financial_impact(&user.access(), query_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(impact)))
}
