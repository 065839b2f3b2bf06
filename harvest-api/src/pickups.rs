use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use futures_util::{future, stream, StreamExt};
use harvest_core::{PickupFilter, PickupPage, RequestContext};
use harvest_order::{export, PickupStatusUpdate};
use harvest_shared::{NewPickup, Pickup, PickupStatus, Rating};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiResponse, AppError};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::orders::StatusChange;
use crate::state::AppState;

/// Rows per chunk of a streamed export.
const EXPORT_CHUNK_ROWS: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct PickupQuery {
    pub status: Option<PickupStatus>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl PickupQuery {
    fn filter(&self) -> PickupFilter {
        PickupFilter {
            status: self.status,
            search: self.search.clone(),
            location: self.location.clone(),
            from: self.start_date,
            to: self.end_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PickupStatusRequest {
    pub status: PickupStatus,
    #[serde(default)]
    pub expected_status: Option<PickupStatus>,
    #[serde(default)]
    pub rating: Option<Rating>,
}

/// POST /v1/pickups
pub async fn create_pickup(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(new): ApiJson<NewPickup>,
) -> Result<(StatusCode, Json<ApiResponse<Pickup>>), AppError> {
    let pickup = state.pickups.create(&ctx, new).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(pickup)))
}

/// GET /v1/pickups
pub async fn list_pickups(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<PickupQuery>,
) -> Result<Json<ApiResponse<PickupPage>>, AppError> {
    let page = state
        .pickups
        .query(&ctx, query.filter(), query.offset, query.limit)
        .await?;
    Ok(ApiResponse::ok(page))
}

/// GET /v1/pickups/export
/// Streams matching pickups as CSV. Paging parameters are ignored.
pub async fn export_pickups(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<PickupQuery>,
) -> Result<Response, AppError> {
    let rows = state.pickups.export(&ctx, query.filter()).await?;
    info!(rows = rows.len(), actor = ?ctx.actor(), "Pickup export started");

    let chunks: Vec<Vec<_>> = rows.chunks(EXPORT_CHUNK_ROWS).map(<[_]>::to_vec).collect();
    let header = stream::once(future::ready(export::header_csv()));
    let body = header.chain(stream::iter(chunks).map(|chunk| export::rows_csv(&chunk)));

    let filename = format!("attachment; filename=\"pickups-{}.csv\"", Utc::now().format("%Y%m%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// POST /v1/pickups/{id}/assign
pub async fn assign_driver(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(pickup_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignDriverRequest>,
) -> Result<Json<ApiResponse<Pickup>>, AppError> {
    let pickup = state.pickups.assign_driver(&ctx, pickup_id, req.driver_id).await?;
    Ok(ApiResponse::ok(pickup))
}

/// POST /v1/pickups/{id}/status
pub async fn update_pickup_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(pickup_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<PickupStatusRequest>,
) -> Result<Json<ApiResponse<StatusChange<PickupStatus>>>, AppError> {
    let outcome = state
        .pickups
        .update_status(
            &ctx,
            PickupStatusUpdate {
                pickup_id,
                target: req.status,
                expected: req.expected_status,
                rating: req.rating,
            },
        )
        .await?;
    Ok(ApiResponse::ok(StatusChange::describe("pickup", pickup_id, outcome)))
}

/// POST /v1/pickups/{id}/cancel
pub async fn cancel_pickup(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(pickup_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<StatusChange<PickupStatus>>>, AppError> {
    let outcome = state.pickups.cancel(&ctx, pickup_id).await?;
    Ok(ApiResponse::ok(StatusChange::describe("pickup", pickup_id, outcome)))
}
