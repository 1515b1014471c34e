pub mod health;
pub mod routes;
pub mod sse;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::daemon::events::NotificationHub;
use crate::daemon::runner::{DispatchRequest, JobRunner};
use crate::models::AppConfig;
use crate::storage::JobStore;

/// Shared application state for the Axum server.
pub struct AppState {
    pub job_store: Arc<dyn JobStore>,
    pub hub: Arc<NotificationHub>,
    pub runner: Arc<JobRunner>,
    pub dispatch_tx: mpsc::Sender<DispatchRequest>,
    pub config: Arc<AppConfig>,
    /// Directory served under `/output`.
    pub output_dir: PathBuf,
    pub start_time: Instant,
    pub api_key_configured: bool,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let output = ServeDir::new(&state.output_dir);

    Router::new()
        .route("/", get(routes::root))
        .route("/api/health", get(health::health_check))
        .route("/api/generate-ad-async", post(routes::generate_ad_async))
        .route(
            "/api/job/{job_id}",
            get(routes::get_job).delete(routes::cancel_job),
        )
        .route("/api/jobs", get(routes::list_jobs))
        .route("/api/dashboard", get(routes::dashboard))
        .route("/api/events", get(sse::sse_handler))
        .route("/ws", get(ws::ws_handler))
        .nest_service("/output", output)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
