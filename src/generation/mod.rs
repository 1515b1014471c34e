pub mod gemini;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::AdgenError;

pub use gemini::GeminiGenerator;

/// Produces media artifacts for a prompt and returns their public URL
/// (e.g. `/output/logo_1a2b3c4d.png`).
#[async_trait]
pub trait MediaGenerator: Send + Sync {
    async fn generate_logo(&self, prompt: &str) -> Result<String, AdgenError>;
    /// `logo_url` is the URL previously returned by `generate_logo`, used as a
    /// visual reference when the backend supports it.
    async fn generate_video(
        &self,
        prompt: &str,
        logo_url: Option<&str>,
    ) -> Result<String, AdgenError>;
}

/// Prompt sent to the image model for a logo.
pub fn logo_prompt(prompt: &str) -> String {
    format!(
        "Create a logo for {}. Make it minimalist, professional, suitable for brand identity. \
         Use a clean vector style with transparent background if possible.",
        prompt
    )
}

/// Prompt sent to the video model for a short advertisement.
pub fn video_prompt(prompt: &str) -> String {
    format!(
        "Create an animated advertisement for social media marketing campaign for the given \
         prompt: '{}'. Make it engaging, professional, suitable for platforms like Instagram \
         Reels or TikTok. Keep it around 4 seconds.",
        prompt
    )
}

// --- Mock implementation for testing ---

/// Behaviour of a [`MockGenerator`].
#[derive(Clone, Debug)]
pub struct MockGeneratorConfig {
    pub logo_url: String,
    pub video_url: String,
    /// When set, `generate_logo` fails with this message.
    pub logo_error: Option<String>,
    /// When set, `generate_video` fails with this message.
    pub video_error: Option<String>,
    /// Time each call takes before returning.
    pub delay: Duration,
}

impl Default for MockGeneratorConfig {
    fn default() -> Self {
        Self {
            logo_url: "/output/logo_mock.png".to_string(),
            video_url: "/output/video_mock.mp4".to_string(),
            logo_error: None,
            video_error: None,
            delay: Duration::ZERO,
        }
    }
}

/// In-process generator with canned results. Records the prompts it was called with.
pub struct MockGenerator {
    config: Arc<Mutex<MockGeneratorConfig>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockGenerator {
    pub fn new(config: MockGeneratorConfig) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A generator whose logo call fails with `error`.
    pub fn with_logo_error(error: &str) -> Self {
        Self::new(MockGeneratorConfig {
            logo_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// A generator whose video call fails with `error`.
    pub fn with_video_error(error: &str) -> Self {
        Self::new(MockGeneratorConfig {
            video_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// A generator where every call takes `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockGeneratorConfig {
            delay,
            ..Default::default()
        })
    }

    /// Calls made so far, as `logo:<prompt>` / `video:<prompt>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn snapshot(&self, call: String) -> MockGeneratorConfig {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        self.config
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new(MockGeneratorConfig::default())
    }
}

#[async_trait]
impl MediaGenerator for MockGenerator {
    async fn generate_logo(&self, prompt: &str) -> Result<String, AdgenError> {
        let config = self.snapshot(format!("logo:{}", prompt));
        if !config.delay.is_zero() {
            tokio::time::sleep(config.delay).await;
        }
        match config.logo_error {
            Some(error) => Err(AdgenError::Generation(error)),
            None => Ok(config.logo_url),
        }
    }

    async fn generate_video(
        &self,
        prompt: &str,
        _logo_url: Option<&str>,
    ) -> Result<String, AdgenError> {
        let config = self.snapshot(format!("video:{}", prompt));
        if !config.delay.is_zero() {
            tokio::time::sleep(config.delay).await;
        }
        match config.video_error {
            Some(error) => Err(AdgenError::Generation(error)),
            None => Ok(config.video_url),
        }
    }
}
