use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

use super::AppState;
use crate::daemon::events::NotificationHub;

/// GET /ws: upgrade to a WebSocket that receives every job event as JSON text.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Forward hub events to the socket until either side goes away.
///
/// Text frames from the client are echoed back as `Received: <text>`.
async fn handle_socket(socket: WebSocket, hub: Arc<NotificationHub>) {
    let (subscriber_id, mut rx) = hub.subscribe().await;
    tracing::info!(subscriber_id = %subscriber_id, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    // Hub closed during shutdown.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize job event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    tracing::debug!(subscriber_id = %subscriber_id, "WebSocket sink closed");
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let reply = format!("Received: {}", text.as_str());
                        if sink.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(subscriber_id = %subscriber_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    hub.unsubscribe(subscriber_id).await;
    tracing::info!(subscriber_id = %subscriber_id, "WebSocket disconnected");
}
