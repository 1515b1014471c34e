use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, RwLock, Semaphore};

use crate::backoff::{self, BackoffConfig};
use crate::daemon::events::{JobEvent, NotificationHub};
use crate::errors::AdgenError;
use crate::generation::MediaGenerator;
use crate::models::{Job, JobUpdate};
use crate::storage::JobStore;

/// Error recorded on jobs still running when the server stops.
pub const SHUTDOWN_MESSAGE: &str = "Interrupted by server shutdown";
/// Error recorded on jobs found unfinished at start-up.
pub const RESTART_MESSAGE: &str = "Interrupted by server restart";

/// Why a run is being asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A client asked for the job to be cancelled.
    User,
    /// The server is shutting down.
    Shutdown,
}

/// Work item sent to the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub job_id: String,
}

/// Handle to a running job, allowing monitoring and cancellation.
pub struct RunHandle {
    pub job_id: String,
    pub join_handle: tokio::task::JoinHandle<()>,
    /// Taken when a cancellation is sent; `None` means one is already pending.
    pub cancel_tx: Option<oneshot::Sender<CancelReason>>,
}

pub type ActiveRuns = Arc<RwLock<HashMap<String, RunHandle>>>;

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    NotFound,
    /// The job had already finished; nothing changed.
    AlreadyTerminal(Job),
    /// The owning task was signalled and will stop at its next milestone.
    Requested(Job),
    /// No task owned the job, so it was marked cancelled directly.
    Cancelled(Job),
}

/// Why `execute` stopped before completion.
enum Interrupt {
    Cancel(CancelReason),
    Failed(String),
    Store(anyhow::Error),
}

/// Runs one task per job, walking it through the generation milestones.
///
/// Within a job, every status write goes through the task that owns it. The
/// only other writer is [`JobRunner::cancel`], and it writes only when no task
/// is registered in `active_runs`, under that map's write lock.
pub struct JobRunner {
    job_store: Arc<dyn JobStore>,
    hub: Arc<NotificationHub>,
    generator: Arc<dyn MediaGenerator>,
    active_runs: ActiveRuns,
    permits: Arc<Semaphore>,
    generation_timeout: Duration,
    storage_backoff: BackoffConfig,
}

impl JobRunner {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        hub: Arc<NotificationHub>,
        generator: Arc<dyn MediaGenerator>,
        max_concurrent_jobs: usize,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            job_store,
            hub,
            generator,
            active_runs: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            generation_timeout,
            storage_backoff: BackoffConfig {
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(5),
                max_retries: 5,
                ..Default::default()
            },
        }
    }

    /// Override the retry policy used when persisting a final state fails.
    pub fn with_storage_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.storage_backoff = backoff;
        self
    }

    pub async fn active_count(&self) -> usize {
        self.active_runs.read().await.len()
    }

    /// Spawn the task for `job_id` and register it in `active_runs`.
    ///
    /// Does nothing if a task for this job is already registered.
    pub async fn launch(self: &Arc<Self>, job_id: String) {
        let mut runs = self.active_runs.write().await;
        if runs.contains_key(&job_id) {
            tracing::debug!(job_id = %job_id, "Job already has a running task");
            return;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel::<CancelReason>();
        let runner = Arc::clone(self);
        let task_job_id = job_id.clone();

        // The map's write lock is held until the handle is inserted, so the
        // task's own removal below always observes its handle.
        let join_handle = tokio::spawn(async move {
            runner.process(&task_job_id, cancel_rx).await;
            runner.active_runs.write().await.remove(&task_job_id);
        });

        runs.insert(
            job_id.clone(),
            RunHandle {
                job_id,
                join_handle,
                cancel_tx: Some(cancel_tx),
            },
        );
    }

    /// Request cancellation of `job_id`.
    pub async fn cancel(&self, job_id: &str) -> anyhow::Result<CancelOutcome> {
        let mut runs = self.active_runs.write().await;

        let job = match self.job_store.get_job(job_id).await? {
            Some(job) => job,
            None => return Ok(CancelOutcome::NotFound),
        };
        if job.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(job));
        }

        if let Some(handle) = runs.get_mut(job_id) {
            if let Some(tx) = handle.cancel_tx.take() {
                let _ = tx.send(CancelReason::User);
                tracing::info!(job_id, "Cancellation requested");
            }
            return Ok(CancelOutcome::Requested(job));
        }

        let job = self
            .job_store
            .update_job(job_id, JobUpdate::cancelled())
            .await?;
        drop(runs);

        tracing::info!(job_id, "Job cancelled before it started");
        self.hub
            .broadcast(JobEvent::JobCancelled {
                job_id: job_id.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(CancelOutcome::Cancelled(job))
    }

    async fn process(&self, job_id: &str, mut cancel_rx: oneshot::Receiver<CancelReason>) {
        // Jobs waiting for a slot stay pending and can still be cancelled.
        let _permit = tokio::select! {
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            reason = &mut cancel_rx => {
                let reason = reason.unwrap_or(CancelReason::Shutdown);
                self.stop(job_id, reason).await;
                return;
            }
        };

        let job = match self.job_store.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id, "Dispatched job no longer exists");
                return;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to load dispatched job");
                return;
            }
        };
        if job.is_terminal() {
            tracing::debug!(job_id, status = %job.status, "Job already finished, skipping");
            return;
        }

        match self.execute(&job, &mut cancel_rx).await {
            Ok((logo_url, video_url)) => {
                tracing::info!(job_id, "Job completed");
                let event = JobEvent::JobCompleted {
                    job_id: job_id.to_string(),
                    logo_url: logo_url.clone(),
                    video_url: video_url.clone(),
                    timestamp: Utc::now(),
                };
                self.finish(job_id, JobUpdate::completed(logo_url, video_url), event)
                    .await;
            }
            Err(Interrupt::Cancel(reason)) => self.stop(job_id, reason).await,
            Err(Interrupt::Failed(message)) => {
                tracing::warn!(job_id, error = %message, "Job failed");
                self.fail(job_id, message).await;
            }
            Err(Interrupt::Store(e)) => {
                if is_conflict(&e) {
                    tracing::warn!(job_id, error = %e, "Job changed underneath its runner, stopping");
                    return;
                }
                tracing::error!(job_id, error = %e, "Failed to record job progress");
                self.fail(job_id, format!("Storage error: {}", error_detail(&e)))
                    .await;
            }
        }
    }

    /// Walk the milestones. Returns the artifact URLs once every requested
    /// output exists and the job is ready to be marked completed.
    async fn execute(
        &self,
        job: &Job,
        cancel_rx: &mut oneshot::Receiver<CancelReason>,
    ) -> Result<(String, Option<String>), Interrupt> {
        let job_id = job.job_id.as_str();

        self.checkpoint(job_id, 10, cancel_rx).await?;
        tracing::info!(job_id, video = job.job_type.wants_video(), "Job started");
        self.hub
            .broadcast(JobEvent::JobStarted {
                job_id: job_id.to_string(),
                prompt: job.prompt.clone(),
                generate_video: job.job_type.wants_video(),
                timestamp: Utc::now(),
            })
            .await;

        self.checkpoint(job_id, 30, cancel_rx).await?;
        let logo_url = self
            .generate("Logo", self.generator.generate_logo(&job.prompt))
            .await?;
        self.checkpoint(job_id, 60, cancel_rx).await?;

        let video_url = if job.job_type.wants_video() {
            self.checkpoint(job_id, 70, cancel_rx).await?;
            let url = self
                .generate(
                    "Video",
                    self.generator.generate_video(&job.prompt, Some(&logo_url)),
                )
                .await?;
            self.checkpoint(job_id, 90, cancel_rx).await?;
            Some(url)
        } else {
            None
        };

        if let Some(reason) = cancel_requested(cancel_rx) {
            return Err(Interrupt::Cancel(reason));
        }
        Ok((logo_url, video_url))
    }

    /// Record a processing milestone unless a cancellation is pending.
    async fn checkpoint(
        &self,
        job_id: &str,
        progress: u8,
        cancel_rx: &mut oneshot::Receiver<CancelReason>,
    ) -> Result<(), Interrupt> {
        if let Some(reason) = cancel_requested(cancel_rx) {
            return Err(Interrupt::Cancel(reason));
        }
        self.job_store
            .update_job(job_id, JobUpdate::processing(progress))
            .await
            .map_err(Interrupt::Store)?;
        tracing::debug!(job_id, progress, "Milestone recorded");
        Ok(())
    }

    async fn generate<F>(&self, stage: &str, call: F) -> Result<String, Interrupt>
    where
        F: Future<Output = Result<String, AdgenError>>,
    {
        match tokio::time::timeout(self.generation_timeout, call).await {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(e)) => Err(Interrupt::Failed(format!(
                "{} generation failed: {}",
                stage,
                e.detail()
            ))),
            Err(_) => Err(Interrupt::Failed(format!(
                "{} generation failed: timed out after {}s",
                stage,
                self.generation_timeout.as_secs()
            ))),
        }
    }

    async fn stop(&self, job_id: &str, reason: CancelReason) {
        match reason {
            CancelReason::User => {
                tracing::info!(job_id, "Job cancelled");
                let event = JobEvent::JobCancelled {
                    job_id: job_id.to_string(),
                    timestamp: Utc::now(),
                };
                self.finish(job_id, JobUpdate::cancelled(), event).await;
            }
            CancelReason::Shutdown => {
                tracing::info!(job_id, "Job interrupted by shutdown");
                self.fail(job_id, SHUTDOWN_MESSAGE.to_string()).await;
            }
        }
    }

    async fn fail(&self, job_id: &str, message: String) {
        let event = JobEvent::JobFailed {
            job_id: job_id.to_string(),
            error: message.clone(),
            timestamp: Utc::now(),
        };
        self.finish(job_id, JobUpdate::failed(message), event).await;
    }

    /// Write a terminal state and announce it. A failed write is retried by
    /// flushing the store with backoff; the in-memory record already holds
    /// the new state, so readers see it even if every flush fails.
    async fn finish(&self, job_id: &str, update: JobUpdate, event: JobEvent) {
        match self.job_store.update_job(job_id, update).await {
            Ok(_) => {}
            Err(e) if is_storage(&e) => {
                tracing::error!(job_id, error = %e, "Failed to persist final job state, retrying");
                let store = Arc::clone(&self.job_store);
                let flushed = backoff::retry(
                    &self.storage_backoff,
                    "jobs.json flush",
                    |_: &anyhow::Error| true,
                    || {
                        let store = Arc::clone(&store);
                        async move { store.flush().await }
                    },
                )
                .await;
                if let Err(e) = flushed {
                    tracing::error!(
                        job_id,
                        error = %e,
                        "Giving up persisting final job state"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Could not record final job state");
                return;
            }
        }
        self.hub.broadcast(event).await;
    }

    /// Signal every running task to stop, then wait for all of them against a
    /// single `grace` deadline.
    ///
    /// Tasks still running at the deadline are aborted and their jobs marked
    /// failed directly.
    pub async fn shutdown(&self, grace: Duration) {
        let mut handles: Vec<RunHandle> = {
            let mut runs = self.active_runs.write().await;
            runs.drain().map(|(_, handle)| handle).collect()
        };
        tracing::info!(count = handles.len(), "Stopping active jobs");

        for handle in handles.iter_mut() {
            if let Some(tx) = handle.cancel_tx.take() {
                let _ = tx.send(CancelReason::Shutdown);
            }
        }

        // One grace period covers every run, not one per run.
        let deadline = tokio::time::Instant::now() + grace;
        for handle in handles {
            let abort = handle.join_handle.abort_handle();
            match tokio::time::timeout_at(deadline, handle.join_handle).await {
                Ok(Ok(())) => {
                    tracing::info!(job_id = %handle.job_id, "Job stopped gracefully");
                }
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %handle.job_id, error = %e, "Job task failed during shutdown");
                }
                Err(_) => {
                    tracing::warn!(
                        job_id = %handle.job_id,
                        "Job did not stop within {}ms grace period, aborting",
                        grace.as_millis()
                    );
                    abort.abort();
                    self.abandon(&handle.job_id).await;
                }
            }
        }
    }

    async fn abandon(&self, job_id: &str) {
        match self.job_store.get_job(job_id).await {
            Ok(Some(job)) if !job.is_terminal() => {
                self.fail(job_id, SHUTDOWN_MESSAGE.to_string()).await;
            }
            Ok(_) => {}
            Err(e) => tracing::error!(job_id, error = %e, "Failed to load job during shutdown"),
        }
    }
}

/// Receive dispatch requests and launch a task for each.
pub fn spawn_dispatch_loop(
    runner: Arc<JobRunner>,
    mut dispatch_rx: mpsc::Receiver<DispatchRequest>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = dispatch_rx.recv().await {
            runner.launch(request.job_id).await;
        }
        tracing::debug!("Dispatch channel closed");
    })
}

fn cancel_requested(cancel_rx: &mut oneshot::Receiver<CancelReason>) -> Option<CancelReason> {
    match cancel_rx.try_recv() {
        Ok(reason) => Some(reason),
        Err(TryRecvError::Empty) => None,
        // Sender dropped without a message: the handle was discarded at shutdown.
        Err(TryRecvError::Closed) => Some(CancelReason::Shutdown),
    }
}

fn is_storage(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<AdgenError>(), Some(AdgenError::Storage(_)))
}

fn is_conflict(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<AdgenError>(),
        Some(AdgenError::Conflict(_)) | Some(AdgenError::NotFound(_))
    )
}

fn error_detail(e: &anyhow::Error) -> String {
    match e.downcast_ref::<AdgenError>() {
        Some(err) => err.detail().to_string(),
        None => e.to_string(),
    }
}

/// Mark jobs left non-terminal by a previous process as failed.
///
/// Returns the number of jobs recovered.
pub async fn recover_interrupted_jobs(job_store: &dyn JobStore) -> anyhow::Result<usize> {
    let active = job_store.list_active().await?;
    let mut recovered = 0;
    for job in active {
        match job_store
            .update_job(&job.job_id, JobUpdate::failed(RESTART_MESSAGE))
            .await
        {
            Ok(_) => {
                recovered += 1;
                tracing::info!(job_id = %job.job_id, previous = %job.status, "Marked interrupted job as failed");
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Failed to recover interrupted job");
            }
        }
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockGenerator;
    use crate::models::{JobStatus, NewJob};
    use crate::storage::jobs::JsonJobStore;
    use tempfile::TempDir;

    async fn setup(generator: MockGenerator) -> (Arc<JobRunner>, Arc<dyn JobStore>, Arc<NotificationHub>, TempDir) {
        let tmp = TempDir::new().expect("tmp");
        let store: Arc<dyn JobStore> = Arc::new(
            JsonJobStore::new(tmp.path().to_path_buf())
                .await
                .expect("store"),
        );
        let hub = Arc::new(NotificationHub::new(32));
        let runner = Arc::new(JobRunner::new(
            Arc::clone(&store),
            Arc::clone(&hub),
            Arc::new(generator),
            2,
            Duration::from_secs(5),
        ));
        (runner, store, hub, tmp)
    }

    async fn wait_terminal(store: &Arc<dyn JobStore>, job_id: &str) -> Job {
        for _ in 0..200 {
            let job = store.get_job(job_id).await.expect("get").expect("found");
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    #[test]
    fn test_cancel_requested_states() {
        let (tx, mut rx) = oneshot::channel::<CancelReason>();
        assert_eq!(cancel_requested(&mut rx), None);
        tx.send(CancelReason::User).expect("send");
        assert_eq!(cancel_requested(&mut rx), Some(CancelReason::User));

        let (tx, mut rx) = oneshot::channel::<CancelReason>();
        drop(tx);
        assert_eq!(cancel_requested(&mut rx), Some(CancelReason::Shutdown));
    }

    #[tokio::test]
    async fn test_launch_runs_job_to_completion() {
        let (runner, store, hub, _tmp) = setup(MockGenerator::default()).await;
        let (_id, mut events) = hub.subscribe().await;
        let job = store
            .create_job(NewJob::new("coffee shop", false))
            .await
            .expect("create");

        runner.launch(job.job_id.clone()).await;
        let done = wait_terminal(&store, &job.job_id).await;

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.logo_url.as_deref(), Some("/output/logo_mock.png"));
        assert!(done.video_url.is_none());

        assert_eq!(events.recv().await.expect("started").event_type(), "job_started");
        assert_eq!(events.recv().await.expect("completed").event_type(), "job_completed");
    }

    #[tokio::test]
    async fn test_task_removes_itself_from_active_runs() {
        let (runner, store, _hub, _tmp) = setup(MockGenerator::default()).await;
        let job = store
            .create_job(NewJob::new("coffee shop", false))
            .await
            .expect("create");

        runner.launch(job.job_id.clone()).await;
        wait_terminal(&store, &job.job_id).await;
        for _ in 0..100 {
            if runner.active_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run handle was never removed");
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (runner, _store, _hub, _tmp) = setup(MockGenerator::default()).await;
        let outcome = runner.cancel("job_000000000000").await.expect("cancel");
        assert_eq!(outcome, CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_cancel_without_task_marks_cancelled() {
        let (runner, store, hub, _tmp) = setup(MockGenerator::default()).await;
        let (_id, mut events) = hub.subscribe().await;
        let job = store
            .create_job(NewJob::new("coffee shop", true))
            .await
            .expect("create");

        let outcome = runner.cancel(&job.job_id).await.expect("cancel");
        match outcome {
            CancelOutcome::Cancelled(job) => {
                assert_eq!(job.status, JobStatus::Cancelled);
                assert!(job.logo_url.is_none());
            }
            other => panic!("Expected Cancelled, got {:?}", other),
        }
        let event = events.recv().await.expect("event");
        assert_eq!(event.event_type(), "job_cancelled");
        assert_eq!(event.job_id(), job.job_id);

        // A task launched afterwards sees the terminal record and leaves it alone.
        runner.launch(job.job_id.clone()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = store.get_job(&job.job_id).await.expect("get").expect("found");
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert_eq!(stored.progress, 0);
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_noop() {
        let (runner, store, _hub, _tmp) = setup(MockGenerator::default()).await;
        let job = store
            .create_job(NewJob::new("coffee shop", false))
            .await
            .expect("create");
        runner.launch(job.job_id.clone()).await;
        let done = wait_terminal(&store, &job.job_id).await;

        let outcome = runner.cancel(&job.job_id).await.expect("cancel");
        assert_eq!(outcome, CancelOutcome::AlreadyTerminal(done.clone()));
        let stored = store.get_job(&job.job_id).await.expect("get").expect("found");
        assert_eq!(stored, done);
    }

    #[tokio::test]
    async fn test_cancel_running_job_stops_at_next_milestone() {
        let (runner, store, _hub, _tmp) =
            setup(MockGenerator::with_delay(Duration::from_millis(200))).await;
        let job = store
            .create_job(NewJob::new("coffee shop", true))
            .await
            .expect("create");

        runner.launch(job.job_id.clone()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = runner.cancel(&job.job_id).await.expect("cancel");
        assert!(matches!(outcome, CancelOutcome::Requested(_)));

        let done = wait_terminal(&store, &job.job_id).await;
        assert_eq!(done.status, JobStatus::Cancelled);
        assert_eq!(done.progress, 30);
        assert!(done.logo_url.is_none());
        assert!(done.video_url.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_fails_running_jobs() {
        let (runner, store, _hub, _tmp) =
            setup(MockGenerator::with_delay(Duration::from_millis(100))).await;
        let job = store
            .create_job(NewJob::new("coffee shop", false))
            .await
            .expect("create");

        runner.launch(job.job_id.clone()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.shutdown(Duration::from_secs(5)).await;

        let stored = store.get_job(&job.job_id).await.expect("get").expect("found");
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some(SHUTDOWN_MESSAGE));
        assert_eq!(runner.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_grace_is_shared_across_stuck_jobs() {
        let (runner, store, _hub, _tmp) =
            setup(MockGenerator::with_delay(Duration::from_secs(10))).await;
        let mut ids = Vec::new();
        for i in 0..2 {
            let job = store
                .create_job(NewJob::new(format!("stuck {}", i), false))
                .await
                .expect("create");
            runner.launch(job.job_id.clone()).await;
            ids.push(job.job_id);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.active_count().await, 2);

        let started = std::time::Instant::now();
        runner.shutdown(Duration::from_millis(300)).await;
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(550), "took {:?}", elapsed);
        for id in &ids {
            let stored = store.get_job(id).await.expect("get").expect("found");
            assert_eq!(stored.status, JobStatus::Failed);
            assert_eq!(stored.error_message.as_deref(), Some(SHUTDOWN_MESSAGE));
        }
        assert_eq!(runner.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_with_no_active_runs() {
        let (runner, _store, _hub, _tmp) = setup(MockGenerator::default()).await;
        runner.shutdown(Duration::from_secs(1)).await;
        assert_eq!(runner.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_recover_interrupted_jobs() {
        let (_runner, store, _hub, _tmp) = setup(MockGenerator::default()).await;
        let pending = store
            .create_job(NewJob::new("pending", false))
            .await
            .expect("create");
        let processing = store
            .create_job(NewJob::new("processing", false))
            .await
            .expect("create");
        store
            .update_job(&processing.job_id, JobUpdate::processing(30))
            .await
            .expect("update");
        let cancelled = store
            .create_job(NewJob::new("cancelled", false))
            .await
            .expect("create");
        store
            .update_job(&cancelled.job_id, JobUpdate::cancelled())
            .await
            .expect("update");

        let recovered = recover_interrupted_jobs(store.as_ref()).await.expect("recover");
        assert_eq!(recovered, 2);

        for id in [&pending.job_id, &processing.job_id] {
            let job = store.get_job(id).await.expect("get").expect("found");
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error_message.as_deref(), Some(RESTART_MESSAGE));
        }
        let job = store
            .get_job(&processing.job_id)
            .await
            .expect("get")
            .expect("found");
        assert_eq!(job.progress, 30);
        let job = store
            .get_job(&cancelled.job_id)
            .await
            .expect("get")
            .expect("found");
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
