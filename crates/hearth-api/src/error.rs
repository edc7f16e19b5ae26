use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use hearth_types::error::CoreError;

/// Wrapper that maps the domain taxonomy onto HTTP statuses. Conflict should
/// have been recovered internally (detect-and-reuse) before reaching here;
/// if one leaks, treat it like a transient server fault.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            CoreError::Authorization(_) => (StatusCode::FORBIDDEN, "authorization"),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::Conflict(_) | CoreError::Transient(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        let body = ErrorBody {
            error: kind,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(CoreError::Transient(e.to_string()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError(CoreError::Transient(format!("blocking task failed: {}", e)))
    }
}
