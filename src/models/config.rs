use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Where generated artifacts are written. Defaults to `{data_dir}/output`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Never read from or written to config files; comes from `GOOGLE_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_subscriber_buffer() -> usize {
    64
}

fn default_generation_timeout_secs() -> u64 {
    600
}

fn default_list_limit() -> usize {
    50
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_video_model() -> String {
    "veo-3.1-generate-preview".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            api_key: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            output_dir: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            subscriber_buffer: default_subscriber_buffer(),
            generation_timeout_secs: default_generation_timeout_secs(),
            default_list_limit: default_list_limit(),
            cors_origins: default_cors_origins(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolved artifact directory, given the resolved data directory.
    pub fn resolve_output_dir(&self, data_dir: &std::path::Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("output"))
    }
}
