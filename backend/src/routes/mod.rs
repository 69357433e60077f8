//! Route definitions for the stock reconciliation API

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - stock transfers
        .nest("/transfers", transfer_routes(state.clone()))
        // Protected routes - discrepancy queries
        .nest("/queries", query_routes(state.clone()))
        // Protected routes - branch statistics and stock
        .nest("/branches", branch_routes(state.clone()))
        // Protected routes - attachment uploads
        .nest("/uploads", upload_routes(state))
}

/// Stock transfer routes (protected)
fn transfer_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_transfers).post(handlers::create_transfer),
        )
        .route(
            "/:transfer_id",
            get(handlers::get_transfer).delete(handlers::delete_transfer),
        )
        .route("/:transfer_id/dispatch", post(handlers::dispatch_transfer))
        .route("/:transfer_id/deliver", post(handlers::deliver_transfer))
        .route("/:transfer_id/cancel", post(handlers::cancel_transfer))
        .route("/:transfer_id/finalize", post(handlers::finalize_transfer))
        .route("/:transfer_id/notes", post(handlers::add_transfer_note))
        .route(
            "/:transfer_id/confirm-receipt",
            post(handlers::confirm_receipt),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Discrepancy query routes (protected)
fn query_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_queries).post(handlers::create_query))
        .route("/:query_id", get(handlers::get_query))
        .route("/:query_id/responses", post(handlers::add_query_response))
        .route("/:query_id/assign", post(handlers::assign_query))
        .route("/:query_id/resolve", post(handlers::resolve_query))
        .route("/:query_id/close", post(handlers::close_query))
        .route(
            "/:query_id/financial-impacts",
            post(handlers::record_financial_impact),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Branch routes (protected)
fn branch_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/:branch_id/statistics",
            get(handlers::get_branch_statistics),
        )
        .route("/:branch_id/stock", get(handlers::get_branch_stock))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Upload routes (protected)
fn upload_routes(state: AppState) -> Router<AppState> {
    // Leave headroom for multipart framing; the handler enforces the file limit.
    let body_limit = state.config.storage.max_upload_bytes.saturating_mul(2);
    Router::new()
        .route("/", post(handlers::upload_files))
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
