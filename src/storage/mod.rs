pub mod jobs;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Job, JobUpdate, NewJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Validate and persist a new pending job.
    async fn create_job(&self, new: NewJob) -> Result<Job>;
    async fn get_job(&self, id: &str) -> Result<Option<Job>>;
    /// Jobs owned by `user_id`, most recent first, at most `limit`.
    async fn list_jobs(&self, user_id: &str, limit: usize) -> Result<Vec<Job>>;
    /// Every job still pending or processing, regardless of owner.
    async fn list_active(&self) -> Result<Vec<Job>>;
    async fn count(&self) -> Result<usize>;
    /// Apply a partial update. Rejects updates that would break a record invariant.
    async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job>;
    /// Rewrite the backing storage from the in-memory state.
    async fn flush(&self) -> Result<()>;
}
