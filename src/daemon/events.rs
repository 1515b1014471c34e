use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Lifecycle notification pushed to subscribers.
///
/// Serialized with a `type` tag, e.g. `{"type":"job_started","job_id":...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobStarted {
        job_id: String,
        prompt: String,
        generate_video: bool,
        timestamp: DateTime<Utc>,
    },
    JobCompleted {
        job_id: String,
        logo_url: String,
        video_url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    JobFailed {
        job_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    JobCancelled {
        job_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobCancelled { job_id, .. } => job_id,
        }
    }

    /// The `type` tag this event serializes with.
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::JobStarted { .. } => "job_started",
            JobEvent::JobCompleted { .. } => "job_completed",
            JobEvent::JobFailed { .. } => "job_failed",
            JobEvent::JobCancelled { .. } => "job_cancelled",
        }
    }
}

/// Identifies one registered subscriber.
pub type SubscriberId = Uuid;

/// Fan-out of job events to every connected client.
///
/// Each subscriber owns a bounded queue. A slow subscriber whose queue is
/// full misses that event; the publisher never blocks and other subscribers
/// are unaffected. Subscribers whose receiver has been dropped are pruned on
/// the next broadcast.
pub struct NotificationHub {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<JobEvent>>>,
    buffer: usize,
}

impl NotificationHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber. Only events broadcast after this call are delivered.
    pub async fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscriber_id = %id, "Subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        if self.subscribers.write().await.remove(&id).is_some() {
            tracing::debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    /// Deliver `event` to every current subscriber without waiting on any of them.
    ///
    /// Returns the number of subscribers the event was queued for.
    pub async fn broadcast(&self, event: JobEvent) -> usize {
        let mut subscribers = self.subscribers.write().await;
        let mut delivered = 0;

        subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    subscriber_id = %id,
                    event = event.event_type(),
                    job_id = event.job_id(),
                    "Subscriber queue full, dropping event"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber_id = %id, "Pruning closed subscriber");
                false
            }
        });

        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drop every subscriber queue so their streams end.
    pub async fn close_all(&self) {
        let mut subscribers = self.subscribers.write().await;
        let count = subscribers.len();
        subscribers.clear();
        tracing::info!(count, "Closed all subscribers");
    }
}
