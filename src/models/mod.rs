pub mod config;
pub mod job;

pub use config::{AppConfig, GeminiConfig};
pub use job::{Job, JobStatus, JobType, JobUpdate, NewJob, StatusSummary};
