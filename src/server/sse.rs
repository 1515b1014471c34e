use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::AppState;
use crate::daemon::events::{NotificationHub, SubscriberId};

#[derive(Debug, Deserialize, Default)]
pub struct SseParams {
    pub job_id: Option<String>,
}

/// Removes the subscriber from the hub when the SSE stream is dropped (client disconnects).
struct SseDropGuard {
    hub: Arc<NotificationHub>,
    subscriber_id: SubscriberId,
}

impl Drop for SseDropGuard {
    fn drop(&mut self) {
        tracing::debug!(subscriber_id = %self.subscriber_id, "SSE client disconnected");
        let hub = Arc::clone(&self.hub);
        let id = self.subscriber_id;
        // Drop can't await; the hub also prunes closed queues on the next broadcast.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { hub.unsubscribe(id).await });
        }
    }
}

/// GET /api/events?job_id=
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SseParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (subscriber_id, rx) = state.hub.subscribe().await;
    tracing::info!(subscriber_id = %subscriber_id, "SSE client connected");

    let filter_job_id = params.job_id.filter(|id| !id.trim().is_empty());

    // Lives as long as the stream.
    let drop_guard = SseDropGuard {
        hub: Arc::clone(&state.hub),
        subscriber_id,
    };

    let stream = ReceiverStream::new(rx).filter_map(move |event| {
        let _ = &drop_guard;
        if let Some(ref job_id) = filter_job_id {
            if event.job_id() != job_id {
                return None;
            }
        }

        match serde_json::to_string(&event) {
            Ok(data) => Some(Ok(Event::default().event(event.event_type()).data(data))),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize job event");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}
