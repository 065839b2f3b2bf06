use axum::{
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod drivers;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod orders;
pub mod pickups;
pub mod reports;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(middleware::ANTI_FORGERY_HEADER),
        ]);

    let v1 = Router::new()
        .route("/orders", post(orders::place_order))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", post(orders::update_order_status))
        .route("/pickups", post(pickups::create_pickup).get(pickups::list_pickups))
        .route("/pickups/export", get(pickups::export_pickups))
        .route("/pickups/{id}/assign", post(pickups::assign_driver))
        .route("/pickups/{id}/status", post(pickups::update_pickup_status))
        .route("/pickups/{id}/cancel", post(pickups::cancel_pickup))
        .route("/drivers", get(drivers::list_drivers))
        .route("/drivers/stats", get(drivers::driver_statistics))
        .route("/drivers/{id}/availability", post(drivers::set_availability))
        .route("/reports/sales", get(reports::sales_report))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", v1)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
