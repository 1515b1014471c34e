use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub google_api_configured: bool,
    pub uptime_seconds: u64,
    /// Jobs currently pending or processing.
    pub active_jobs: usize,
    pub subscribers: usize,
    pub version: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Health check");

    let active_jobs = match state.job_store.list_active().await {
        Ok(jobs) => jobs.len(),
        Err(e) => {
            tracing::warn!("Health check could not count active jobs: {}", e);
            0
        }
    };

    let response = HealthResponse {
        status: "healthy".to_string(),
        google_api_configured: state.api_key_configured,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_jobs,
        subscribers: state.hub.subscriber_count().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}
