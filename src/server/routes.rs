use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use chrono::Utc;
use tokio::sync::mpsc;
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};

use crate::engine::types::{TableId, UserRole};
use crate::events::GameEventRecord;
use crate::scanner::{ScanDelivery, ScanMessage};
use crate::table::coordinator::{Caller, CreateTableParams, TableAction, TableCoordinator};
use crate::table::snapshot::TableView;

use super::dto::{
    ActionRequest, CreateTableRequest, EventsQuery, JoinRequest, KickRequest, ScanRequest,
    ScanResponse, TableSummary,
};
use super::error::ApiError;
use super::logging::log_requests;

const SCAN_ACK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServerContext {
    pub coordinator: Arc<TableCoordinator>,
    pub scans: mpsc::Sender<ScanDelivery>,
}

pub fn build_router(context: Arc<ServerContext>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tables", post(create_table))
        .route("/tables/:table_id/join", post(join_table))
        .route("/tables/:table_id/leave", post(leave_table))
        .route("/tables/:table_id/kick", post(kick_player))
        .route("/tables/:table_id/action", post(table_action))
        .route("/tables/:table_id/snapshot", get(table_snapshot))
        .route("/tables/:table_id/events", get(table_events))
        .route("/scans", post(ingest_scan))
        .layer(Extension(context))
        .layer(middleware::from_fn(log_requests))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|_: BoxError| async {
                    StatusCode::REQUEST_TIMEOUT
                }))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(cors)
}

/// Caller identity arrives pre-authenticated from the auth collaborator.
fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::bad_request("missing or invalid x-user-id header"))?;
    let role = match headers.get("x-user-role").and_then(|v| v.to_str().ok()) {
        Some("player") => UserRole::Player,
        Some("dealer") => UserRole::Dealer,
        _ => return Err(ApiError::bad_request("missing or invalid x-user-role header")),
    };
    Ok(Caller { user_id, role })
}

async fn create_table(
    Extension(ctx): Extension<Arc<ServerContext>>,
    headers: HeaderMap,
    Json(payload): Json<CreateTableRequest>,
) -> Result<Json<TableSummary>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let table = ctx
        .coordinator
        .create_table(
            &caller,
            CreateTableParams {
                name: payload.name,
                small_blind: payload.small_blind,
                big_blind: payload.big_blind,
                max_seats: payload.max_seats,
                blind_step_seconds: payload.blind_step_seconds,
            },
        )
        .await?;
    Ok(Json(table.into()))
}

async fn join_table(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Path(table_id): Path<TableId>,
    headers: HeaderMap,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<TableView>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let view = ctx.coordinator.join(&caller, table_id, payload.buy_in).await?;
    Ok(Json(view))
}

async fn leave_table(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Path(table_id): Path<TableId>,
    headers: HeaderMap,
) -> Result<Json<TableView>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let view = ctx.coordinator.leave(&caller, table_id).await?;
    Ok(Json(view))
}

async fn kick_player(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Path(table_id): Path<TableId>,
    headers: HeaderMap,
    Json(payload): Json<KickRequest>,
) -> Result<Json<TableView>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let view = ctx
        .coordinator
        .remove_player(&caller, table_id, payload.player_id)
        .await?;
    Ok(Json(view))
}

async fn table_action(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Path(table_id): Path<TableId>,
    headers: HeaderMap,
    Json(payload): Json<ActionRequest>,
) -> Result<Json<TableView>, ApiError> {
    let caller = caller_from_headers(&headers)?;
    let action = match payload {
        ActionRequest::StartGame => TableAction::StartGame,
        ActionRequest::DealCard { rank, suit } => TableAction::DealCard { rank, suit },
        ActionRequest::ResetTable => TableAction::ResetTable,
        ActionRequest::Raise { amount } => TableAction::Raise { amount },
        ActionRequest::Check => TableAction::Check,
        ActionRequest::Fold => TableAction::Fold,
    };
    let view = ctx.coordinator.action(&caller, table_id, action).await?;
    Ok(Json(view))
}

async fn table_snapshot(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Path(table_id): Path<TableId>,
    headers: HeaderMap,
) -> Result<Json<TableView>, ApiError> {
    // Snapshots are viewable without identity; hole cards stay hidden.
    let viewer = caller_from_headers(&headers).ok().map(|c| c.user_id);
    let view = ctx.coordinator.snapshot(viewer, table_id).await?;
    Ok(Json(view))
}

async fn table_events(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Path(table_id): Path<TableId>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<GameEventRecord>>, ApiError> {
    let events = ctx.coordinator.events_delta(table_id, query.since).await?;
    Ok(Json(events))
}

/// Hardware bridge delivery point. The 200 response is the message ack
/// and is only sent after the scan has been fully processed; the bridge
/// retries on timeout, giving at-least-once delivery.
async fn ingest_scan(
    Extension(ctx): Extension<Arc<ServerContext>>,
    Json(payload): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, ApiError> {
    let (delivery, acked) = ScanDelivery::new(ScanMessage {
        serial: payload.serial,
        barcode: payload.barcode,
        enqueued_at: Utc::now(),
    });
    ctx.scans
        .send(delivery)
        .await
        .map_err(|_| ApiError::unavailable("scan ingester is not running"))?;

    match tokio::time::timeout(SCAN_ACK_TIMEOUT, acked).await {
        Ok(Ok(())) => Ok(Json(ScanResponse {
            status: "processed",
        })),
        _ => Err(ApiError::unavailable("scan not yet processed")),
    }
}
