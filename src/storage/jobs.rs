use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::AdgenError;
use crate::models::job::validate_new_job;
use crate::models::{Job, JobUpdate, NewJob};
use crate::storage::JobStore;

/// On-disk layout of `jobs.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct JobsFile {
    jobs: Vec<Job>,
}

#[derive(Serialize)]
struct JobsFileRef<'a> {
    jobs: &'a [Job],
}

/// Flat-file job store. The whole collection lives in memory (most recent
/// first) and is rewritten to `jobs.json` on every mutation while the write
/// lock is held, so rewrites from different jobs never interleave.
pub struct JsonJobStore {
    file_path: PathBuf,
    cache: RwLock<Vec<Job>>,
}

impl JsonJobStore {
    /// Create a new JsonJobStore, loading existing data from disk if present.
    ///
    /// If `jobs.json` is corrupted (invalid JSON), creates a backup at
    /// `jobs.json.bak`, logs a warning, and starts with an empty job list.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("jobs.json");

        let jobs = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read jobs.json")?;
            match serde_json::from_str::<JobsFile>(&content) {
                Ok(parsed) => parsed.jobs,
                Err(e) => {
                    tracing::warn!(
                        "jobs.json is corrupted ({}), creating backup and starting empty",
                        e
                    );
                    let backup_path = data_dir.join("jobs.json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to create backup of corrupted jobs.json: {}",
                            backup_err
                        );
                    }
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        tracing::debug!("Loaded {} job(s) from {}", jobs.len(), file_path.display());

        Ok(Self {
            file_path,
            cache: RwLock::new(jobs),
        })
    }

    /// Atomically write the jobs cache to disk.
    /// Writes to a .tmp file first, then renames to the actual file.
    async fn persist(&self, jobs: &[Job]) -> Result<(), AdgenError> {
        let tmp_path = self.file_path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(&JobsFileRef { jobs })?;

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| AdgenError::Storage(format!("Failed to write temporary jobs file: {}", e)))?;

        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .map_err(|e| AdgenError::Storage(format!("Failed to rename temporary jobs file: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn create_job(&self, new: NewJob) -> Result<Job> {
        validate_new_job(&new)?;

        let mut cache = self.cache.write().await;

        let mut job = Job::from_new(&new, Utc::now());
        while cache.iter().any(|j| j.job_id == job.job_id) {
            job.job_id = crate::models::job::new_job_id();
        }

        cache.insert(0, job.clone());
        if let Err(e) = self.persist(&cache).await {
            // Nobody holds the id yet, so the record is dropped rather than left orphaned.
            cache.remove(0);
            return Err(e.into());
        }

        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().find(|j| j.job_id == id).cloned())
    }

    async fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<Job>> {
        let cache = self.cache.read().await;
        Ok(cache
            .iter()
            .filter(|j| j.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> Result<Vec<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().filter(|j| !j.is_terminal()).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.cache.read().await.len())
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job> {
        let mut cache = self.cache.write().await;

        let idx = cache
            .iter()
            .position(|j| j.job_id == id)
            .ok_or_else(|| AdgenError::NotFound(format!("Job with id '{}' not found", id)))?;

        let mut updated = cache[idx].clone();
        updated.apply(update, Utc::now())?;
        cache[idx] = updated.clone();

        // The in-memory record keeps the new state even if the write fails;
        // the caller sees the error and may retry with `flush`.
        self.persist(&cache).await?;

        Ok(updated)
    }

    async fn flush(&self) -> Result<()> {
        let cache = self.cache.write().await;
        self.persist(&cache).await?;
        Ok(())
    }
}
