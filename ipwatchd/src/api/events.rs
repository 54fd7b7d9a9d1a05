use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use shared::types::EntryEvent;
use crate::notifier::Notifier;
use super::routes::AppState;

pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Subscribe before the upgrade completes so no event slips between the two
    let events = state.notifier.subscribe();
    ws.on_upgrade(move |socket| viewer_session(socket, events, state.notifier))
}

/// Text frame for one event: `{"event": "...", "data": Entry}`
pub fn encode_event(event: &EntryEvent) -> serde_json::Result<String> {
    serde_json::to_string(&event.to_frame())
}

/// Forward events to one viewer until either side goes away.
/// Incoming frames other than close are ignored.
async fn viewer_session(
    socket: WebSocket,
    mut events: tokio::sync::broadcast::Receiver<EntryEvent>,
    notifier: Notifier,
) {
    tracing::info!("Viewer connected ({} watching)", notifier.viewer_count());
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Viewer fell behind, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let payload = match encode_event(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!("Failed to encode {} event: {}", event.name(), e);
                        continue;
                    }
                };

                if sender.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    drop(events);
    tracing::info!("Viewer disconnected ({} watching)", notifier.viewer_count());
}
