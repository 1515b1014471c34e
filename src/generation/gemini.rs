use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{logo_prompt, video_prompt, MediaGenerator};
use crate::backoff::{self, BackoffConfig};
use crate::errors::AdgenError;
use crate::models::GeminiConfig;

/// URL prefix under which the output directory is served.
pub const OUTPUT_URL_PREFIX: &str = "/output";

/// Generator backed by the Gemini REST API: an image model for logos and a
/// long-running Veo operation for videos. Artifacts are written into
/// `output_dir` and returned as `/output/<file>` URLs.
pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeminiConfig,
    api_key: String,
    output_dir: PathBuf,
    backoff: BackoffConfig,
}

/// A failed HTTP exchange, tagged with whether retrying could help.
#[derive(Debug)]
struct CallError {
    transient: bool,
    error: AdgenError,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            transient: err.is_timeout() || err.is_connect(),
            error: err.into(),
        }
    }
}

impl CallError {
    fn permanent(error: AdgenError) -> Self {
        Self {
            transient: false,
            error,
        }
    }
}

// --- Response shapes (only the fields we read) ---

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig, output_dir: PathBuf) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Gemini API key is not configured"))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()?;

        let backoff = BackoffConfig {
            max_retries: config.max_retries,
            ..Default::default()
        };

        Ok(Self {
            client,
            config,
            api_key,
            output_dir,
            backoff,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base.trim_end_matches('/'),
            model,
            method
        )
    }

    /// Send a request built by `build`, retrying transient failures, and
    /// decode the JSON body.
    async fn call_json<T, B>(&self, label: &str, build: B) -> Result<T, AdgenError>
    where
        T: for<'de> Deserialize<'de>,
        B: Fn() -> reqwest::RequestBuilder,
    {
        let build = &build;
        let api_key = self.api_key.as_str();
        backoff::retry(
            &self.backoff,
            label,
            |e: &CallError| e.transient,
            move || async move {
                let resp = build()
                    .header("x-goog-api-key", api_key)
                    .send()
                    .await?;
                let resp = check_status(resp).await?;
                resp.json::<T>().await.map_err(|e| {
                    CallError::permanent(AdgenError::Generation(format!(
                        "Unexpected response from {}: {}",
                        label, e
                    )))
                })
            },
        )
        .await
        .map_err(|e| e.error)
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, AdgenError> {
        let client = &self.client;
        let api_key = self.api_key.as_str();
        backoff::retry(
            &self.backoff,
            "video download",
            |e: &CallError| e.transient,
            move || async move {
                let resp = client
                    .get(uri)
                    .header("x-goog-api-key", api_key)
                    .send()
                    .await?;
                let resp = check_status(resp).await?;
                Ok::<_, CallError>(resp.bytes().await?.to_vec())
            },
        )
        .await
        .map_err(|e| e.error)
    }

    /// Load a previously saved logo as an inline image reference. Missing or
    /// foreign URLs are skipped; the video is then generated from text alone.
    async fn reference_image(&self, logo_url: Option<&str>) -> Option<serde_json::Value> {
        let filename = logo_url?
            .strip_prefix(OUTPUT_URL_PREFIX)?
            .trim_start_matches('/');
        if filename.is_empty() || filename.contains("..") {
            return None;
        }
        match tokio::fs::read(self.output_dir.join(filename)).await {
            Ok(bytes) => Some(json!({
                "bytesBase64Encoded": STANDARD.encode(bytes),
                "mimeType": mime_for_filename(filename),
            })),
            Err(e) => {
                tracing::warn!(file = filename, error = %e, "Logo reference unavailable");
                None
            }
        }
    }

    async fn save_artifact(&self, prefix: &str, ext: &str, bytes: &[u8]) -> Result<String, AdgenError> {
        let hex = Uuid::new_v4().simple().to_string();
        let filename = format!("{}_{}.{}", prefix, &hex[..8], ext);
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(&filename);
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Artifact saved");
        Ok(format!("{}/{}", OUTPUT_URL_PREFIX, filename))
    }
}

/// Map non-success statuses to errors. 429 and 5xx are retried.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, CallError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = extract_api_error(&body).unwrap_or_else(|| status.to_string());
    Err(CallError {
        transient: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        error: AdgenError::Generation(detail),
    })
}

/// Pull `error.message` out of a Google API error body.
fn extract_api_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["message"].as_str().map(str::to_string)
}

fn image_extension(mime_type: Option<&str>) -> &'static str {
    match mime_type {
        Some("image/jpeg") => "jpg",
        Some("image/webp") => "webp",
        _ => "png",
    }
}

fn mime_for_filename(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

fn first_inline_image(resp: GenerateContentResponse) -> Option<InlineData> {
    resp.candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
}

fn first_video_uri(op: Operation) -> Option<String> {
    op.response?
        .generate_video_response?
        .generated_samples
        .into_iter()
        .find_map(|s| s.video.and_then(|v| v.uri))
}

#[async_trait]
impl MediaGenerator for GeminiGenerator {
    async fn generate_logo(&self, prompt: &str) -> Result<String, AdgenError> {
        tracing::info!(model = %self.config.image_model, "Generating logo");

        let url = self.model_url(&self.config.image_model, "generateContent");
        let body = json!({
            "contents": [{ "parts": [{ "text": logo_prompt(prompt) }] }]
        });
        let resp: GenerateContentResponse = self
            .call_json("logo request", || self.client.post(&url).json(&body))
            .await?;

        let image = first_inline_image(resp)
            .ok_or_else(|| AdgenError::Generation("No image generated in response".to_string()))?;
        let bytes = STANDARD
            .decode(image.data.as_bytes())
            .map_err(|e| AdgenError::Generation(format!("Invalid image data: {}", e)))?;

        self.save_artifact("logo", image_extension(image.mime_type.as_deref()), &bytes)
            .await
    }

    async fn generate_video(
        &self,
        prompt: &str,
        logo_url: Option<&str>,
    ) -> Result<String, AdgenError> {
        tracing::info!(model = %self.config.video_model, "Starting video generation");

        let url = self.model_url(&self.config.video_model, "predictLongRunning");
        let mut instance = json!({ "prompt": video_prompt(prompt) });
        if let Some(image) = self.reference_image(logo_url).await {
            instance["image"] = image;
        }
        let body = json!({ "instances": [instance] });
        let mut op: Operation = self
            .call_json("video request", || self.client.post(&url).json(&body))
            .await?;

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let started = tokio::time::Instant::now();
        while !op.done {
            tracing::debug!(
                operation = %op.name,
                elapsed_secs = started.elapsed().as_secs(),
                "Waiting for video generation"
            );
            tokio::time::sleep(poll_interval).await;
            let poll_url = format!(
                "{}/{}",
                self.config.api_base.trim_end_matches('/'),
                op.name
            );
            op = self
                .call_json("video poll", || self.client.get(&poll_url))
                .await?;
        }

        if let Some(err) = op.error.as_ref() {
            let message = err
                .message
                .clone()
                .unwrap_or_else(|| "Video generation failed".to_string());
            return Err(AdgenError::Generation(message));
        }

        let uri = first_video_uri(op)
            .ok_or_else(|| AdgenError::Generation("No video generated in response".to_string()))?;
        let bytes = self.download(&uri).await?;
        self.save_artifact("video", "mp4", &bytes).await
    }
}
