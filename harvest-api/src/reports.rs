use axum::{extract::State, Extension, Json};
use chrono::NaiveDate;
use harvest_core::{CoreError, RequestContext};
use harvest_sales::SalesReport;
use harvest_shared::DateRange;
use serde::Deserialize;

use crate::error::{ApiResponse, AppError};
use crate::extract::ApiQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SalesQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// GET /v1/reports/sales
pub async fn sales_report(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<SalesQuery>,
) -> Result<Json<ApiResponse<SalesReport>>, AppError> {
    let range = DateRange::new(query.start_date, query.end_date).map_err(CoreError::from)?;
    Ok(ApiResponse::ok(state.sales.report(&ctx, range).await?))
}
