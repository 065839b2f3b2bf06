use axum::{extract::State, http::StatusCode, Extension, Json};
use harvest_core::{RequestContext, TransitionOutcome};
use harvest_order::OrderTransition;
use harvest_shared::{NewOrder, Order, OrderStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiResponse, AppError};
use crate::extract::{ApiJson, ApiPath};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "S: Deserialize<'de>"))]
pub struct StatusRequest<S> {
    pub status: S,
    /// What the caller last saw; omitted means "whatever is stored now".
    #[serde(default)]
    pub expected_status: Option<S>,
}

/// Result of a status update as reported to clients.
#[derive(Debug, Serialize)]
pub struct StatusChange<S> {
    pub message: String,
    pub previous_status: S,
    pub new_status: S,
    pub no_op: bool,
}

impl<S: Copy + std::fmt::Display> StatusChange<S> {
    pub fn describe(entity: &str, id: Uuid, outcome: TransitionOutcome<S>) -> Self {
        let message = if outcome.no_op {
            format!("{} {} is already {}", entity, id, outcome.current)
        } else {
            format!(
                "{} {} moved from {} to {}",
                entity, id, outcome.previous, outcome.current
            )
        };
        Self {
            message,
            previous_status: outcome.previous,
            new_status: outcome.current,
            no_op: outcome.no_op,
        }
    }
}

/// POST /v1/orders
/// Checkout hands over a placed order
pub async fn place_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(new): ApiJson<NewOrder>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), AppError> {
    let order = state.orders.place(&ctx, new).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(order)))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(order_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Order>>, AppError> {
    let order = state.orders.get(&ctx, order_id).await?;
    Ok(ApiResponse::ok(order))
}

/// POST /v1/orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(order_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusRequest<OrderStatus>>,
) -> Result<Json<ApiResponse<StatusChange<OrderStatus>>>, AppError> {
    let outcome = state
        .orders
        .transition(
            &ctx,
            OrderTransition {
                order_id,
                target: req.status,
                expected: req.expected_status,
            },
        )
        .await?;
    Ok(ApiResponse::ok(StatusChange::describe("order", order_id, outcome)))
}
