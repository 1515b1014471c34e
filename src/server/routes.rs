use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::daemon::runner::{CancelOutcome, DispatchRequest};
use crate::errors::AdgenError;
use crate::models::job::DEFAULT_USER_ID;
use crate::models::{Job, JobStatus, JobUpdate, NewJob, StatusSummary};

/// Reported when a job was stored but could not be handed to the runner.
pub const DISPATCH_CLOSED_MESSAGE: &str = "Job queue is not accepting work";

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn query_rejected(rejection: QueryRejection) -> Response {
    tracing::warn!("Query rejected: {}", rejection.body_text());
    error_response(
        StatusCode::BAD_REQUEST,
        "validation_error",
        &rejection.body_text(),
    )
}

fn status_for(err: &AdgenError) -> StatusCode {
    match err {
        AdgenError::NotFound(_) => StatusCode::NOT_FOUND,
        AdgenError::Conflict(_) => StatusCode::CONFLICT,
        AdgenError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a store/runner error to an HTTP response, using the `AdgenError`
/// category when there is one.
fn failure_response(action: &str, e: &anyhow::Error) -> Response {
    match e.downcast_ref::<AdgenError>() {
        Some(err) => {
            let status = status_for(err);
            if status.is_server_error() {
                tracing::error!("{} failed: {}", action, err);
            } else {
                tracing::warn!("{} rejected: {}", action, err);
            }
            error_response(status, err.code(), err.detail())
        }
        None => {
            tracing::error!("{} failed: {}", action, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &format!("{} failed: {}", action, e),
            )
        }
    }
}

fn not_found(job_id: &str) -> Response {
    tracing::warn!("Job not found: '{}'", job_id);
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        &format!("Job with id '{}' not found", job_id),
    )
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub job_id: String,
    pub message: String,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub success: bool,
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub logo_url: Option<String>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            success: true,
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            logo_url: job.logo_url,
            video_url: job.video_url,
            error_message: job.error_message,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobsListResponse {
    pub success: bool,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub summary: StatusSummary,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    pub job_id: String,
    /// False when the job had already finished and nothing changed.
    pub cancelled: bool,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListJobsParams {
    pub user_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DashboardParams {
    pub user_id: Option<String>,
}

fn owner_param(user_id: Option<&str>) -> &str {
    match user_id.map(str::trim) {
        Some(u) if !u.is_empty() => u,
        _ => DEFAULT_USER_ID,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Ad Generator API is running" }))
}

/// POST /api/generate-ad-async
pub async fn generate_ad_async(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewJob>, JsonRejection>,
) -> Response {
    let Json(new_job) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!("Job submission rejected: {}", rejection.body_text());
            return error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                &rejection.body_text(),
            );
        }
    };

    let job = match state.job_store.create_job(new_job).await {
        Ok(job) => job,
        Err(e) => return failure_response("Job submission", &e),
    };

    tracing::info!(
        job_id = %job.job_id,
        user_id = %job.user_id,
        video = job.job_type.wants_video(),
        "Job submitted"
    );

    let request = DispatchRequest {
        job_id: job.job_id.clone(),
    };
    if let Err(e) = state.dispatch_tx.send(request).await {
        tracing::error!(job_id = %job.job_id, "Dispatch queue closed: {}", e);
        // The record would otherwise sit in pending until the next restart.
        if let Err(e) = state
            .job_store
            .update_job(&job.job_id, JobUpdate::failed(DISPATCH_CLOSED_MESSAGE))
            .await
        {
            tracing::error!(job_id = %job.job_id, "Failed to mark undispatched job failed: {:#}", e);
        }
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            DISPATCH_CLOSED_MESSAGE,
        );
    }

    (
        StatusCode::OK,
        Json(SubmitResponse {
            success: true,
            message: "Generation job started. Use job ID to track progress.".to_string(),
            job_id: job.job_id,
            prompt: job.prompt,
        }),
    )
        .into_response()
}

/// GET /api/job/{job_id}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    match state.job_store.get_job(&job_id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(JobStatusResponse::from(job))).into_response(),
        Ok(None) => not_found(&job_id),
        Err(e) => failure_response("Job lookup", &e),
    }
}

/// DELETE /api/job/{job_id}
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let outcome = match state.runner.cancel(&job_id).await {
        Ok(outcome) => outcome,
        Err(e) => return failure_response("Job cancellation", &e),
    };

    let (status, cancelled, job, message) = match outcome {
        CancelOutcome::NotFound => return not_found(&job_id),
        CancelOutcome::AlreadyTerminal(job) => {
            let message = format!("Job is already {}", job.status);
            (StatusCode::OK, false, job, message)
        }
        CancelOutcome::Requested(job) => (
            StatusCode::ACCEPTED,
            true,
            job,
            "Cancellation requested".to_string(),
        ),
        CancelOutcome::Cancelled(job) => (
            StatusCode::OK,
            true,
            job,
            "Job cancelled successfully".to_string(),
        ),
    };

    (
        status,
        Json(CancelResponse {
            success: true,
            job_id: job.job_id,
            cancelled,
            status: job.status,
            message,
        }),
    )
        .into_response()
}

/// GET /api/jobs?user_id=&limit=
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListJobsParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return query_rejected(rejection),
    };
    let owner = owner_param(params.user_id.as_deref());
    let limit = params.limit.unwrap_or(state.config.default_list_limit);
    tracing::debug!(user_id = owner, limit, "Listing jobs");

    match state.job_store.list_jobs(owner, limit).await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(JobsListResponse {
                success: true,
                jobs,
            }),
        )
            .into_response(),
        Err(e) => failure_response("Job listing", &e),
    }
}

/// GET /api/dashboard?user_id=
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    params: Result<Query<DashboardParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return query_rejected(rejection),
    };
    let owner = owner_param(params.user_id.as_deref());

    match state.job_store.list_jobs(owner, usize::MAX).await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(DashboardResponse {
                summary: StatusSummary::from_jobs(&jobs),
                jobs,
            }),
        )
            .into_response(),
        Err(e) => failure_response("Dashboard", &e),
    }
}
