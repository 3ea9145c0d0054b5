//! Health and probe handlers.
//!
//! Readiness failing means new jobs should not be routed to this
//! instance; liveness failing means external orchestration should
//! restart it.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use jobhub_worker::CategoryHealth;

use crate::dto::response::{ApiResponse, HealthResponse, ProbeResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/health
pub async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// GET /api/health/live
pub async fn health_live(State(state): State<AppState>) -> (StatusCode, Json<ProbeResponse>) {
    probe(state.health.live())
}

/// GET /api/health/ready
pub async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<ProbeResponse>) {
    probe(state.health.ready())
}

/// GET /api/health/categories
pub async fn health_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CategoryHealth>>>, ApiError> {
    let snapshot = state.health.snapshot().await?;
    Ok(Json(ApiResponse::ok(snapshot)))
}

fn probe(healthy: bool) -> (StatusCode, Json<ProbeResponse>) {
    if healthy {
        (
            StatusCode::OK,
            Json(ProbeResponse {
                status: "ok".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ProbeResponse {
                status: "unavailable".to_string(),
            }),
        )
    }
}
