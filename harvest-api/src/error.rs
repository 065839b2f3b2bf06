use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use harvest_core::CoreError;
use serde::Serialize;

/// Envelope for every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    TransitionError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::TransitionError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(error_message),
        });

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.public_message();
        match err {
            CoreError::Validation(_) => AppError::ValidationError(message),
            CoreError::InvalidTransition(_) => AppError::TransitionError(message),
            CoreError::Conflict(_) | CoreError::DriverUnavailable { .. } => {
                AppError::ConflictError(message)
            }
            CoreError::NotFound { .. } => AppError::NotFoundError(message),
            CoreError::Forbidden(_) => AppError::AuthorizationError(message),
            CoreError::Persistence(detail) => AppError::InternalServerError(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_statuses() {
        let cases = [
            (CoreError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CoreError::InvalidTransition("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (CoreError::Conflict("x".into()), StatusCode::CONFLICT),
            (CoreError::not_found("order", "1"), StatusCode::NOT_FOUND),
            (CoreError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (CoreError::Persistence("pool closed".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
