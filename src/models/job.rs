use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AdgenError;

/// Owner used when a request does not name one.
pub const DEFAULT_USER_ID: &str = "default";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a record in `self` may be rewritten with status `next`.
    ///
    /// Staying in the same non-terminal status is allowed (progress updates).
    /// Pending may fail directly when a job is abandoned before it starts.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Pending
                    | JobStatus::Processing
                    | JobStatus::Cancelled
                    | JobStatus::Failed
            ),
            JobStatus::Processing => matches!(
                next,
                JobStatus::Processing
                    | JobStatus::Completed
                    | JobStatus::Failed
                    | JobStatus::Cancelled
            ),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which artifacts a job was asked to produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Logo,
    Both,
}

impl JobType {
    pub fn from_video_flag(generate_video: bool) -> Self {
        if generate_video {
            JobType::Both
        } else {
            JobType::Logo
        }
    }

    pub fn wants_video(self) -> bool {
        self == JobType::Both
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub prompt: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub logo_url: Option<String>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: u8,
    pub user_id: String,
}

/// Request body for submitting a generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub prompt: String,
    #[serde(default)]
    pub generate_video: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl NewJob {
    pub fn new(prompt: impl Into<String>, generate_video: bool) -> Self {
        Self {
            prompt: prompt.into(),
            generate_video,
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The owner this job will be filed under. Blank owners fall back to the default.
    pub fn owner(&self) -> &str {
        match self.user_id.as_deref().map(str::trim) {
            Some(u) if !u.is_empty() => u,
            _ => DEFAULT_USER_ID,
        }
    }
}

/// Partial update applied by the job runner. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub logo_url: Option<String>,
    pub video_url: Option<String>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn processing(progress: u8) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn completed(logo_url: String, video_url: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            logo_url: Some(logo_url),
            video_url,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            ..Default::default()
        }
    }
}

/// Generate a fresh job identifier of the form `job_<12 hex>`.
pub fn new_job_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("job_{}", &hex[..12])
}

/// Validate a NewJob before creation.
pub fn validate_new_job(job: &NewJob) -> Result<(), AdgenError> {
    if job.prompt.trim().is_empty() {
        return Err(AdgenError::Validation("Prompt cannot be empty".to_string()));
    }
    Ok(())
}

impl Job {
    /// Build a pending record for a validated submission.
    pub fn from_new(new: &NewJob, now: DateTime<Utc>) -> Self {
        Self {
            job_id: new_job_id(),
            prompt: new.prompt.trim().to_string(),
            job_type: JobType::from_video_flag(new.generate_video),
            status: JobStatus::Pending,
            logo_url: None,
            video_url: None,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            progress: 0,
            user_id: new.owner().to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update, enforcing the record invariants.
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> Result<(), AdgenError> {
        if self.status.is_terminal() {
            return Err(AdgenError::Conflict(format!(
                "Job '{}' is already {}",
                self.job_id, self.status
            )));
        }

        let next = update.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(AdgenError::Conflict(format!(
                "Job '{}' cannot move from {} to {}",
                self.job_id, self.status, next
            )));
        }

        let progress = match (update.progress, next) {
            (Some(p), _) => p,
            (None, JobStatus::Completed) => 100,
            (None, _) => self.progress,
        };
        if progress > 100 {
            return Err(AdgenError::Validation(format!(
                "Progress {} exceeds 100",
                progress
            )));
        }
        if progress < self.progress {
            return Err(AdgenError::Validation(format!(
                "Progress cannot go backwards ({} -> {})",
                self.progress, progress
            )));
        }
        if next == JobStatus::Pending && progress != self.progress {
            return Err(AdgenError::Validation(
                "Progress only advances while processing".to_string(),
            ));
        }

        let has_artifacts = update.logo_url.is_some() || update.video_url.is_some();
        if has_artifacts && next != JobStatus::Completed {
            return Err(AdgenError::Validation(
                "Artifact locations are only recorded on completion".to_string(),
            ));
        }
        if next == JobStatus::Completed {
            if progress != 100 {
                return Err(AdgenError::Validation(
                    "A completed job must report progress 100".to_string(),
                ));
            }
            if update.logo_url.is_none() {
                return Err(AdgenError::Validation(
                    "A completed job requires a logo".to_string(),
                ));
            }
            match (self.job_type.wants_video(), update.video_url.is_some()) {
                (true, false) => {
                    return Err(AdgenError::Validation(
                        "A completed job requires the requested video".to_string(),
                    ))
                }
                (false, true) => {
                    return Err(AdgenError::Validation(
                        "Video was not requested for this job".to_string(),
                    ))
                }
                _ => {}
            }
        }

        let has_message = update
            .error_message
            .as_deref()
            .is_some_and(|m| !m.trim().is_empty());
        if update.error_message.is_some() && next != JobStatus::Failed {
            return Err(AdgenError::Validation(
                "An error message is only recorded on failure".to_string(),
            ));
        }
        if next == JobStatus::Failed && !has_message {
            return Err(AdgenError::Validation(
                "A failed job requires an error message".to_string(),
            ));
        }

        if next == JobStatus::Processing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.progress = progress;
        if let Some(logo_url) = update.logo_url {
            self.logo_url = Some(logo_url);
        }
        if let Some(video_url) = update.video_url {
            self.video_url = Some(video_url);
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        Ok(())
    }
}

/// Per-status counts for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusSummary {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut summary = Self {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Processing => summary.processing += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(job_type: JobType) -> Job {
        let new = NewJob::new("eco-friendly water bottle", job_type.wants_video());
        Job::from_new(&new, Utc::now())
    }

    fn processing_job(job_type: JobType, progress: u8) -> Job {
        let mut job = make_job(job_type);
        job.apply(JobUpdate::processing(progress), Utc::now())
            .expect("start processing");
        job
    }

    #[test]
    fn test_new_job_id_format() {
        let id = new_job_id();
        assert!(id.starts_with("job_"));
        assert_eq!(id.len(), 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_job_id());
    }

    #[test]
    fn test_from_new_defaults() {
        let job = make_job(JobType::Logo);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.user_id, DEFAULT_USER_ID);
        assert_eq!(job.job_type, JobType::Logo);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_owner_falls_back_to_default_when_blank() {
        let new = NewJob::new("a prompt", false).with_user("   ");
        assert_eq!(new.owner(), DEFAULT_USER_ID);
        let new = NewJob::new("a prompt", false).with_user("alice");
        assert_eq!(new.owner(), "alice");
    }

    #[test]
    fn test_validate_rejects_empty_prompt() {
        assert!(validate_new_job(&NewJob::new("", false)).is_err());
        assert!(validate_new_job(&NewJob::new("  \n\t ", true)).is_err());
        assert!(validate_new_job(&NewJob::new("coffee shop", false)).is_ok());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Cancelled).expect("serialize");
        assert_eq!(json, "\"cancelled\"");
        let json = serde_json::to_string(&JobType::Both).expect("serialize");
        assert_eq!(json, "\"both\"");
    }

    #[test]
    fn test_processing_sets_started_at() {
        let job = processing_job(JobType::Logo, 10);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, 10);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_progress_cannot_regress() {
        let mut job = processing_job(JobType::Logo, 60);
        let err = job
            .apply(JobUpdate::processing(30), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AdgenError::Validation(_)));
        assert_eq!(job.progress, 60);
    }

    #[test]
    fn test_progress_cannot_exceed_100() {
        let mut job = processing_job(JobType::Logo, 10);
        assert!(job.apply(JobUpdate::processing(101), Utc::now()).is_err());
    }

    #[test]
    fn test_completed_requires_logo() {
        let mut job = processing_job(JobType::Logo, 60);
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            ..Default::default()
        };
        assert!(job.apply(update, Utc::now()).is_err());
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_completed_requires_requested_video() {
        let mut job = processing_job(JobType::Both, 90);
        let result = job.apply(
            JobUpdate::completed("/output/logo_1.png".to_string(), None),
            Utc::now(),
        );
        assert!(result.is_err());

        job.apply(
            JobUpdate::completed(
                "/output/logo_1.png".to_string(),
                Some("/output/video_1.mp4".to_string()),
            ),
            Utc::now(),
        )
        .expect("complete");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_unrequested_video_rejected() {
        let mut job = processing_job(JobType::Logo, 60);
        let result = job.apply(
            JobUpdate::completed(
                "/output/logo_1.png".to_string(),
                Some("/output/video_1.mp4".to_string()),
            ),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_artifacts_rejected_while_processing() {
        let mut job = processing_job(JobType::Logo, 30);
        let update = JobUpdate {
            progress: Some(60),
            logo_url: Some("/output/logo_1.png".to_string()),
            ..Default::default()
        };
        assert!(job.apply(update, Utc::now()).is_err());
        assert!(job.logo_url.is_none());
    }

    #[test]
    fn test_failed_requires_message() {
        let mut job = processing_job(JobType::Logo, 30);
        assert!(job.apply(JobUpdate::failed("  "), Utc::now()).is_err());
        job.apply(JobUpdate::failed("Logo generation failed: boom"), Utc::now())
            .expect("fail");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 30);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_error_message_rejected_outside_failure() {
        let mut job = processing_job(JobType::Logo, 30);
        let update = JobUpdate {
            progress: Some(60),
            error_message: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(job.apply(update, Utc::now()).is_err());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = processing_job(JobType::Logo, 30);
        job.apply(JobUpdate::cancelled(), Utc::now()).expect("cancel");
        let err = job
            .apply(JobUpdate::processing(60), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AdgenError::Conflict(_)));
        let err = job.apply(JobUpdate::cancelled(), Utc::now()).unwrap_err();
        assert!(matches!(err, AdgenError::Conflict(_)));
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_pending_can_be_cancelled_directly() {
        let mut job = make_job(JobType::Both);
        job.apply(JobUpdate::cancelled(), Utc::now()).expect("cancel");
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.started_at.is_none());
        assert!(job.logo_url.is_none());
    }

    #[test]
    fn test_pending_cannot_complete() {
        let mut job = make_job(JobType::Logo);
        let result = job.apply(
            JobUpdate::completed("/output/logo_1.png".to_string(), None),
            Utc::now(),
        );
        assert!(matches!(result, Err(AdgenError::Conflict(_))));
    }

    #[test]
    fn test_status_summary_counts() {
        let mut jobs = vec![
            make_job(JobType::Logo),
            processing_job(JobType::Logo, 10),
            processing_job(JobType::Both, 70),
        ];
        let mut failed = processing_job(JobType::Logo, 30);
        failed
            .apply(JobUpdate::failed("boom"), Utc::now())
            .expect("fail");
        jobs.push(failed);

        let summary = StatusSummary::from_jobs(&jobs);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.processing, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.cancelled, 0);
    }

    #[test]
    fn test_job_serde_roundtrip_field_names() {
        let job = make_job(JobType::Both);
        let value = serde_json::to_value(&job).expect("serialize");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["job_type"], "both");
        assert!(value["job_id"].is_string());
        assert!(value["logo_url"].is_null());
        let back: Job = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, job);
    }
}
