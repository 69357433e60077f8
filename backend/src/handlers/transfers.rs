//! Stock transfer HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use shared::{
    AddTransferNoteInput, CancelTransferInput, ConfirmReceiptInput, CreateTransferInput,
    MarkDeliveredInput, PaginatedResponse, Pagination, StockTransfer, TransferStatus,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::services::transfer::TransferDetail;
use crate::services::TransferService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTransfersQuery {
    pub status: Option<TransferStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// List transfers received by the caller's branch
pub async fn list_transfers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListTransfersQuery>,
) -> AppResult<Json<PaginatedResponse<StockTransfer>>> {
    let service = TransferService::new(state.db.clone());
    let pagination = Pagination::from_query(query.page, query.limit);
    let transfers = service.list(&user.access(), query.status, &pagination).await?;
    Ok(Json(transfers))
}

/// Create a draft transfer
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<CreateTransferInput>,
) -> AppResult<impl IntoResponse> {
    let service = TransferService::new(state.db.clone());
    let transfer = service.create(&user.access(), input).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Get a transfer with items, queries and notes
pub async fn get_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferDetail>> {
    let service = TransferService::new(state.db.clone());
    let detail = service.get(&user.access(), transfer_id).await?;
    Ok(Json(detail))
}

/// Delete a draft transfer
pub async fn delete_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let service = TransferService::new(state.db.clone());
    service.delete_draft(&user.access(), transfer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dispatch_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<StockTransfer>> {
    let service = TransferService::new(state.db.clone());
    let transfer = service.dispatch(&user.access(), transfer_id).await?;
    Ok(Json(transfer))
}

pub async fn deliver_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<MarkDeliveredInput>,
) -> AppResult<Json<StockTransfer>> {
    state.file_store.verify("photos", &input.photos).await?;
    let service = TransferService::new(state.db.clone());
    let transfer = service.deliver(&user.access(), transfer_id, input).await?;
    Ok(Json(transfer))
}

pub async fn cancel_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<CancelTransferInput>,
) -> AppResult<Json<StockTransfer>> {
    let service = TransferService::new(state.db.clone());
    let transfer = service.cancel(&user.access(), transfer_id, input).await?;
    Ok(Json(transfer))
}

/// Close out a fully received transfer that still has discrepancies
pub async fn finalize_transfer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<StockTransfer>> {
    let service = TransferService::new(state.db.clone());
    let transfer = service.finalize(&user.access(), transfer_id).await?;
    Ok(Json(transfer))
}

pub async fn add_transfer_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<AddTransferNoteInput>,
) -> AppResult<impl IntoResponse> {
    let service = TransferService::new(state.db.clone());
    let note = service.add_note(&user.access(), transfer_id, input).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

/// Confirm receipt of delivered items
pub async fn confirm_receipt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(transfer_id): Path<Uuid>,
    Json(input): Json<ConfirmReceiptInput>,
) -> AppResult<Json<StockTransfer>> {
    let service = TransferService::new(state.db.clone());
    let transfer = service
        .confirm_receipt(&user.access(), transfer_id, input)
        .await?;
    Ok(Json(transfer))
}
