use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::{base_url, connection_error_message};
use crate::backoff::{next_delay, BackoffConfig};

/// Helper to handle reqwest errors and produce a user-friendly connection error.
fn handle_request_error(err: reqwest::Error, host: &str, port: u16) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        anyhow::anyhow!("{}", connection_error_message(host, port))
    } else {
        anyhow::anyhow!("Request failed: {}", err)
    }
}

/// Read a JSON body and turn non-2xx responses into an error carrying the server's message.
async fn read_json(response: reqwest::Response) -> anyhow::Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("Unknown error");
        anyhow::bail!("{}", message);
    }
    Ok(body)
}

/// Format a relative time string like "2 minutes ago".
fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(*dt).num_seconds().max(0);
    if secs < 60 {
        format!("{} seconds ago", secs)
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

fn is_terminal_status(status: &str) -> bool {
    matches!(status, "completed" | "failed" | "cancelled")
}

/// Shorten a prompt for table output.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn print_job(job: &Value) {
    let status = job["status"].as_str().unwrap_or("?");
    println!("Job:      {}", job["job_id"].as_str().unwrap_or("?"));
    println!("Status:   {}", status);
    println!("Progress: {}%", job["progress"].as_u64().unwrap_or(0));
    if let Some(logo) = job["logo_url"].as_str() {
        println!("Logo:     {}", logo);
    }
    if let Some(video) = job["video_url"].as_str() {
        println!("Video:    {}", video);
    }
    if let Some(error) = job["error_message"].as_str() {
        println!("Error:    {}", error);
    }
}

pub async fn cmd_submit(
    host: &str,
    port: u16,
    prompt: &str,
    video: bool,
    user: Option<&str>,
    wait: bool,
) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/api/generate-ad-async", base_url(host, port));

    let mut body = serde_json::json!({
        "prompt": prompt,
        "generate_video": video,
    });
    if let Some(user) = user {
        body["user_id"] = Value::String(user.to_string());
    }

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_json(response).await?;

    let job_id = body["job_id"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing job ID in response"))?;
    println!("Job submitted: {}", job_id);

    if wait {
        let job = watch_job(
            &client,
            &base_url(host, port),
            job_id,
            Duration::from_secs(2),
            &BackoffConfig::default(),
            print_progress,
        )
        .await
        .map_err(|e| with_connection_hint(e, host, port))?;
        print_job(&job);
    }

    Ok(())
}

pub async fn cmd_status(host: &str, port: u16, job: &str, json: bool) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/api/job/{}", base_url(host, port), job);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_json(response).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        print_job(&body);
    }
    Ok(())
}

pub async fn cmd_list(
    host: &str,
    port: u16,
    user: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/api/jobs", base_url(host, port));

    let mut query: Vec<(&str, String)> = Vec::new();
    if let Some(user) = user {
        query.push(("user_id", user.to_string()));
    }
    if let Some(limit) = limit {
        query.push(("limit", limit.to_string()));
    }

    let response = client
        .get(&url)
        .query(&query)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_json(response).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&body["jobs"])?);
        return Ok(());
    }

    let empty_vec = vec![];
    let jobs = body["jobs"].as_array().unwrap_or(&empty_vec);

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<18}{:<12}{:<10}{:<8}{:<18}{}",
        "JOB ID", "STATUS", "PROGRESS", "TYPE", "CREATED", "PROMPT"
    );

    for job in jobs {
        let created = job["created_at"]
            .as_str()
            .and_then(|ts| ts.parse::<DateTime<Utc>>().ok())
            .map(|dt| format_relative_time(&dt))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<18}{:<12}{:<10}{:<8}{:<18}{}",
            job["job_id"].as_str().unwrap_or("?"),
            job["status"].as_str().unwrap_or("?"),
            format!("{}%", job["progress"].as_u64().unwrap_or(0)),
            job["job_type"].as_str().unwrap_or("?"),
            created,
            truncate(job["prompt"].as_str().unwrap_or(""), 40),
        );
    }

    Ok(())
}

pub async fn cmd_dashboard(host: &str, port: u16, user: Option<&str>) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/api/dashboard", base_url(host, port));

    let mut request = client.get(&url);
    if let Some(user) = user {
        request = request.query(&[("user_id", user)]);
    }

    let response = request
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_json(response).await?;

    let summary = &body["summary"];
    for key in ["total", "pending", "processing", "completed", "failed", "cancelled"] {
        println!("{:<12}{}", format!("{}:", key), summary[key].as_u64().unwrap_or(0));
    }
    Ok(())
}

pub async fn cmd_cancel(host: &str, port: u16, job: &str) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/api/job/{}", base_url(host, port), job);

    let response = client
        .delete(&url)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;
    let body = read_json(response).await?;

    let message = body["message"].as_str().unwrap_or("Done");
    println!("{} ({})", message, body["status"].as_str().unwrap_or("?"));
    Ok(())
}

pub async fn cmd_watch(host: &str, port: u16, job: &str, interval: u64) -> anyhow::Result<()> {
    let client = Client::new();
    let job = watch_job(
        &client,
        &base_url(host, port),
        job,
        Duration::from_secs(interval.max(1)),
        &BackoffConfig::default(),
        print_progress,
    )
    .await
    .map_err(|e| with_connection_hint(e, host, port))?;

    print_job(&job);
    if job["status"] == "failed" {
        anyhow::bail!(
            "Job failed: {}",
            job["error_message"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_progress(job: &Value) {
    println!(
        "[{:>3}%] {}",
        job["progress"].as_u64().unwrap_or(0),
        job["status"].as_str().unwrap_or("?")
    );
}

fn with_connection_hint(err: PollError, host: &str, port: u16) -> anyhow::Error {
    match err {
        PollError::Unreachable(_) => anyhow::anyhow!("{}", connection_error_message(host, port)),
        other => anyhow::anyhow!("{}", other),
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Why [`watch_job`] gave up.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Transient failures outlasted the retry budget.
    #[error("Server unreachable: {0}")]
    Unreachable(String),
    /// The server answered with a non-retryable error (e.g. unknown job).
    #[error("{0}")]
    Rejected(String),
}

enum PollFailure {
    Transient(String),
    Fatal(String),
}

async fn fetch_job(client: &Client, url: &str) -> Result<Value, PollFailure> {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) if e.is_connect() || e.is_timeout() => {
            return Err(PollFailure::Transient(e.to_string()))
        }
        Err(e) => return Err(PollFailure::Fatal(format!("Request failed: {}", e))),
    };

    let status = response.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PollFailure::Transient(format!("server returned {}", status)));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| PollFailure::Fatal(format!("Failed to parse response: {}", e)))?;

    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("Unknown error");
        return Err(PollFailure::Fatal(message.to_string()));
    }
    Ok(body)
}

/// Poll `GET /api/job/{job_id}` until the job reaches a terminal state and return its final record.
///
/// `on_update` is called whenever status or progress changes. Connection
/// failures and 5xx/429 responses are retried with exponential backoff; the
/// retry budget resets after every successful poll.
pub async fn watch_job<F>(
    client: &Client,
    base: &str,
    job_id: &str,
    interval: Duration,
    backoff: &BackoffConfig,
    mut on_update: F,
) -> Result<Value, PollError>
where
    F: FnMut(&Value),
{
    let url = format!("{}/api/job/{}", base, job_id);
    let mut last_seen: Option<(String, u64)> = None;
    let mut delay = backoff.initial_delay;
    let mut failures = 0u32;

    loop {
        match fetch_job(client, &url).await {
            Ok(job) => {
                failures = 0;
                delay = backoff.initial_delay;

                let status = job["status"].as_str().unwrap_or("").to_string();
                let progress = job["progress"].as_u64().unwrap_or(0);
                let seen = Some((status.clone(), progress));
                if seen != last_seen {
                    on_update(&job);
                    last_seen = seen;
                }

                if is_terminal_status(&status) {
                    return Ok(job);
                }
                tokio::time::sleep(interval).await;
            }
            Err(PollFailure::Transient(reason)) => {
                if failures >= backoff.max_retries {
                    return Err(PollError::Unreachable(reason));
                }
                failures += 1;
                tracing::debug!(
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "Poll failed ({}), retrying",
                    reason
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, backoff);
            }
            Err(PollFailure::Fatal(reason)) => return Err(PollError::Rejected(reason)),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_backoff(max_retries: u32) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            max_retries,
        }
    }

    /// Serve `responses` in order from `GET /api/job/{id}`, repeating the last one.
    async fn spawn_scripted_server(responses: Vec<(u16, Value)>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let responses = Arc::new(responses);
        let counter = Arc::clone(&hits);

        let app = Router::new().route(
            "/api/job/{job_id}",
            get(move || {
                let responses = Arc::clone(&responses);
                let counter = Arc::clone(&counter);
                async move {
                    let i = counter.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);
                    let (status, body) = responses[i].clone();
                    (AxumStatus::from_u16(status).unwrap(), Json(body))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), hits)
    }

    fn job(status: &str, progress: u64) -> Value {
        serde_json::json!({
            "success": true,
            "job_id": "job_0123456789ab",
            "status": status,
            "progress": progress,
            "logo_url": null,
            "video_url": null,
            "error_message": null
        })
    }

    #[test]
    fn test_format_relative_time_seconds_ago() {
        let dt = Utc::now() - chrono::Duration::seconds(30);
        let result = format_relative_time(&dt);
        assert!(result.contains("seconds ago"), "Got: {}", result);
    }

    #[test]
    fn test_format_relative_time_hours_ago() {
        let dt = Utc::now() - chrono::Duration::hours(3);
        assert_eq!(format_relative_time(&dt), "3 hours ago");
    }

    #[test]
    fn test_truncate_long_prompt() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long prompt indeed", 10), "a very ...");
    }

    #[test]
    fn test_is_terminal_status() {
        assert!(is_terminal_status("completed"));
        assert!(is_terminal_status("failed"));
        assert!(is_terminal_status("cancelled"));
        assert!(!is_terminal_status("pending"));
        assert!(!is_terminal_status("processing"));
    }

    #[tokio::test]
    async fn test_watch_job_reports_changes_until_terminal() {
        let (base, hits) = spawn_scripted_server(vec![
            (200, job("processing", 10)),
            (200, job("processing", 10)),
            (200, job("processing", 60)),
            (200, job("completed", 100)),
        ])
        .await;

        let mut seen = Vec::new();
        let final_job = watch_job(
            &Client::new(),
            &base,
            "job_0123456789ab",
            Duration::from_millis(5),
            &fast_backoff(3),
            |j| seen.push(j["progress"].as_u64().unwrap()),
        )
        .await
        .unwrap();

        assert_eq!(final_job["status"], "completed");
        assert_eq!(seen, vec![10, 60, 100]);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_watch_job_retries_server_errors() {
        let (base, hits) = spawn_scripted_server(vec![
            (503, serde_json::json!({"error": "internal_error", "message": "busy"})),
            (500, serde_json::json!({"error": "internal_error", "message": "busy"})),
            (200, job("failed", 30)),
        ])
        .await;

        let final_job = watch_job(
            &Client::new(),
            &base,
            "job_0123456789ab",
            Duration::from_millis(5),
            &fast_backoff(3),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(final_job["status"], "failed");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_watch_job_gives_up_after_retry_budget() {
        let (base, hits) = spawn_scripted_server(vec![(
            503,
            serde_json::json!({"error": "internal_error", "message": "busy"}),
        )])
        .await;

        let err = watch_job(
            &Client::new(),
            &base,
            "job_0123456789ab",
            Duration::from_millis(5),
            &fast_backoff(2),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Unreachable(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_watch_job_unknown_job_is_not_retried() {
        let (base, hits) = spawn_scripted_server(vec![(
            404,
            serde_json::json!({"error": "not_found", "message": "Job with id 'x' not found"}),
        )])
        .await;

        let err = watch_job(
            &Client::new(),
            &base,
            "x",
            Duration::from_millis(5),
            &fast_backoff(3),
            |_| {},
        )
        .await
        .unwrap_err();

        match err {
            PollError::Rejected(msg) => assert!(msg.contains("not found")),
            other => panic!("Expected Rejected, got: {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_request_error_connection() {
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        // Port 1 on loopback refuses connections.
        let result = client.get("http://127.0.0.1:1").send().await;
        if let Err(e) = result {
            let msg = handle_request_error(e, "127.0.0.1", 1).to_string();
            assert!(
                msg.contains("Could not connect") || msg.contains("Request failed"),
                "Got: {}",
                msg
            );
        }
    }
}
