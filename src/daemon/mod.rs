pub mod events;
pub mod runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::daemon::events::NotificationHub;
use crate::daemon::runner::{recover_interrupted_jobs, spawn_dispatch_loop, DispatchRequest, JobRunner};
use crate::generation::{GeminiGenerator, MediaGenerator};
use crate::models::AppConfig;
use crate::server::{self, AppState};
use crate::storage::jobs::JsonJobStore;
use crate::storage::JobStore;

/// Directory name used under the platform config/data dirs.
const APP_DIR_NAME: &str = "ad-generator";

/// How long running jobs get to reach a milestone after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

fn read_config_file(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::info!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Load the AppConfig using the resolution order:
///   1. --config CLI flag (passed as config_path)
///   2. ADGEN_CONFIG_DIR environment variable
///   3. Platform config dir (dirs::config_dir()/ad-generator/config.json)
///   4. Fall back to {data_dir}/config.json
///   5. If no config file exists, use AppConfig::default()
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            return read_config_file(path);
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    if let Ok(config_dir) = std::env::var("ADGEN_CONFIG_DIR") {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            return read_config_file(&path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(APP_DIR_NAME).join("config.json");
        if path.exists() {
            return read_config_file(&path);
        }
    }

    let path = resolve_data_dir(None).join("config.json");
    if path.exists() {
        return read_config_file(&path);
    }

    tracing::info!("No config file found, using defaults");
    Ok(AppConfig::default())
}

/// Resolve the data directory. If `override_dir` is Some, use it.
/// Otherwise `ADGEN_DATA_DIR`, then the platform data dir
/// (e.g. `~/.local/share/ad-generator` on Linux).
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("ADGEN_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Create the data and artifact directories.
pub async fn create_data_dirs(data_dir: &Path, output_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(output_dir)
        .await
        .context("Failed to create output directory")?;
    tracing::info!("Data directories ensured at: {}", data_dir.display());
    Ok(())
}

/// Read the Gemini API key from the environment. Blank values count as missing.
pub fn api_key_from_env() -> Option<String> {
    std::env::var("GOOGLE_API_KEY")
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log to stderr and to `{data_dir}/server.log`.
///
/// The returned guard flushes the file writer when dropped and must be held
/// for as long as the server runs. Falls back to stderr only if the log file
/// cannot be opened.
fn init_tracing(data_dir: &Path, verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let log_path = data_dir.join("server.log");

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);

            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();

            if result.is_ok() {
                tracing::info!("Logging to stderr and {}", log_path.display());
            }
            Some(guard)
        }
        Err(e) => {
            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init();

            if result.is_ok() {
                tracing::warn!(
                    "Could not open log file {}: {}. Logging to stderr only.",
                    log_path.display(),
                    e
                );
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Server lifecycle
// ---------------------------------------------------------------------------

/// Options for `adgen serve`, applied over the loaded config.
#[derive(Debug, Default)]
pub struct ServeOptions {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub verbose: bool,
}

/// Start the API server and block until Ctrl+C or SIGTERM.
///
/// Start-up order: config, directories, logging, API key check, job store
/// (with recovery of interrupted jobs), notification hub, runner and dispatch
/// loop, HTTP server. Shutdown stops the dispatch loop, lets running jobs
/// reach a milestone, closes subscriber streams and drains the server.
pub async fn start_server(opts: ServeOptions) -> Result<()> {
    let mut config = load_config(opts.config_path.as_deref())?;

    if let Some(h) = opts.host {
        config.host = h;
    }
    if let Some(p) = opts.port {
        config.port = p;
    }

    let data_dir = match (opts.data_dir, config.data_dir.clone()) {
        (Some(d), _) => d,
        (None, Some(d)) => d,
        (None, None) => resolve_data_dir(None),
    };
    let output_dir = config.resolve_output_dir(&data_dir);
    config.data_dir = Some(data_dir.clone());
    config.output_dir = Some(output_dir.clone());

    create_data_dirs(&data_dir, &output_dir).await?;
    let _log_guard = init_tracing(&data_dir, opts.verbose);
    tracing::info!("Data directory: {}", data_dir.display());
    tracing::info!("Output directory: {}", output_dir.display());

    let api_key = api_key_from_env().ok_or_else(|| {
        anyhow::anyhow!("GOOGLE_API_KEY is not set. Add it to the environment or a .env file.")
    })?;
    config.gemini.api_key = Some(api_key);

    let config = Arc::new(config);

    let job_store = Arc::new(JsonJobStore::new(data_dir.clone()).await?) as Arc<dyn JobStore>;
    let recovered = recover_interrupted_jobs(job_store.as_ref()).await?;
    if recovered > 0 {
        tracing::warn!("Marked {} interrupted job(s) as failed", recovered);
    }

    let hub = Arc::new(NotificationHub::new(config.subscriber_buffer));
    let generator = Arc::new(GeminiGenerator::new(config.gemini.clone(), output_dir.clone())?)
        as Arc<dyn MediaGenerator>;
    let runner = Arc::new(JobRunner::new(
        Arc::clone(&job_store),
        Arc::clone(&hub),
        generator,
        config.max_concurrent_jobs,
        Duration::from_secs(config.generation_timeout_secs),
    ));

    let (dispatch_tx, dispatch_rx) = tokio::sync::mpsc::channel::<DispatchRequest>(64);
    let dispatch_handle = spawn_dispatch_loop(Arc::clone(&runner), dispatch_rx);

    let state = Arc::new(AppState {
        job_store: Arc::clone(&job_store),
        hub: Arc::clone(&hub),
        runner: Arc::clone(&runner),
        dispatch_tx,
        config: Arc::clone(&config),
        output_dir: output_dir.clone(),
        start_time: Instant::now(),
        api_key_configured: true,
    });

    let router = server::create_router(Arc::clone(&state));
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .context(format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Ad Generator API listening on http://{}", listener.local_addr()?);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .ok();
    });

    wait_for_signal().await?;

    let _ = shutdown_tx.send(());
    dispatch_handle.abort();

    graceful_shutdown(&runner, &hub, SHUTDOWN_GRACE).await;

    let _ = server_handle.await;

    tracing::info!("Server exited cleanly.");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C signal");
    }
    Ok(())
}

/// Stop running jobs and end every push stream so the HTTP server can drain.
pub async fn graceful_shutdown(runner: &JobRunner, hub: &NotificationHub, grace: Duration) {
    tracing::info!("Beginning graceful shutdown sequence...");
    runner.shutdown(grace).await;
    hub.close_all().await;
    tracing::info!("Graceful shutdown complete.");
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_loading_from_file() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"port": 9100, "max_concurrent_jobs": 2}"#).expect("write");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.port, 9100);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_config_loading_nonexistent_explicit_path_fails() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("missing.json");
        let result = load_config(Some(&path));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Config file not found"));
    }

    #[test]
    fn test_config_loading_invalid_json_fails() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_resolve_data_dir_with_override() {
        let dir = PathBuf::from("/tmp/adgen-test");
        assert_eq!(resolve_data_dir(Some(&dir)), dir);
    }

    #[test]
    fn test_resolve_data_dir_default_not_empty() {
        let dir = resolve_data_dir(None);
        assert!(!dir.as_os_str().is_empty());
    }

    #[tokio::test]
    async fn test_data_directory_creation() {
        let tmp = TempDir::new().expect("tmp");
        let data_dir = tmp.path().join("data");
        let output_dir = data_dir.join("output");

        create_data_dirs(&data_dir, &output_dir).await.expect("create");
        assert!(data_dir.is_dir());
        assert!(output_dir.is_dir());

        // Idempotent
        create_data_dirs(&data_dir, &output_dir).await.expect("create again");
    }

    #[tokio::test]
    async fn test_graceful_shutdown_closes_subscribers() {
        use crate::generation::MockGenerator;

        let tmp = TempDir::new().expect("tmp");
        let store = Arc::new(
            JsonJobStore::new(tmp.path().to_path_buf())
                .await
                .expect("store"),
        ) as Arc<dyn JobStore>;
        let hub = Arc::new(NotificationHub::new(8));
        let runner = JobRunner::new(
            store,
            Arc::clone(&hub),
            Arc::new(MockGenerator::default()),
            1,
            Duration::from_secs(1),
        );
        let (_id, mut rx) = hub.subscribe().await;

        graceful_shutdown(&runner, &hub, Duration::from_secs(1)).await;
        assert!(rx.recv().await.is_none());
    }
}
