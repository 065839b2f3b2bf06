use axum::{extract::State, Extension, Json};
use harvest_core::RequestContext;
use harvest_shared::{Availability, Driver, DriverStatistics};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiResponse, AppError};
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub availability: Availability,
}

/// GET /v1/drivers
pub async fn list_drivers(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<ApiResponse<Vec<Driver>>>, AppError> {
    Ok(ApiResponse::ok(state.drivers.list(&ctx).await?))
}

/// GET /v1/drivers/stats
pub async fn driver_statistics(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<ApiResponse<DriverStatistics>>, AppError> {
    Ok(ApiResponse::ok(state.drivers.statistics(&ctx).await?))
}

/// POST /v1/drivers/{id}/availability
pub async fn set_availability(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(driver_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AvailabilityRequest>,
) -> Result<Json<ApiResponse<Driver>>, AppError> {
    let driver = state
        .drivers
        .set_availability(&ctx, driver_id, req.availability)
        .await?;
    Ok(ApiResponse::ok(driver))
}
