//! Job submission and status handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;
use validator::Validate;

use jobhub_core::error::AppError;
use jobhub_core::types::pagination::{PageRequest, PageResponse};
use jobhub_store::JobStore;

use crate::dto::request::{ListJobsQuery, SubmitJobRequest};
use crate::dto::response::{ApiResponse, JobResponse};
use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/jobs
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<ApiResponse<JobResponse>>), ApiError> {
    request
        .validate()
        .map_err(|e| AppError::validation(e.to_string()))?;

    let job = state.store.submit(&request.category, request.payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok(JobResponse::from(job))),
    ))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;
    Ok(Json(ApiResponse::ok(JobResponse::from(job))))
}

/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<ApiResponse<PageResponse<JobResponse>>>, ApiError> {
    let page = PageRequest::new(query.page.unwrap_or(1), query.page_size.unwrap_or(25));
    let jobs = state
        .store
        .list(query.category.as_deref(), query.state, &page)
        .await?;

    let items = jobs.items.into_iter().map(JobResponse::from).collect();
    let response = PageResponse::new(items, jobs.page, jobs.page_size, jobs.total_items);
    Ok(Json(ApiResponse::ok(response)))
}
