//! Maps domain `AppError` to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use jobhub_core::error::{AppError, ErrorKind};

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

/// HTTP-layer newtype over the domain [`AppError`].
///
/// Axum requires a handler's error type to implement [`IntoResponse`], but
/// the orphan rule forbids implementing that foreign trait directly on the
/// foreign `AppError`. This wrapper carries the identical mapping and
/// converts transparently from `AppError` via `?`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let Self(inner) = &self;
        let (status, error_code) = match &inner.kind {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ErrorKind::UnknownCategory => (StatusCode::BAD_REQUEST, "UNKNOWN_CATEGORY"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Conflict | ErrorKind::DuplicateCategory | ErrorKind::StaleClaim => {
                (StatusCode::CONFLICT, "CONFLICT")
            }
            ErrorKind::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ErrorKind::Database | ErrorKind::Configuration | ErrorKind::Serialization => {
                tracing::error!(error = %inner.message, kind = %inner.kind, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            ErrorKind::Internal => {
                tracing::error!(error = %inner.message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ApiErrorResponse {
            error: error_code.to_string(),
            message: inner.message.clone(),
        };

        (status, Json(body)).into_response()
    }
}
