//! WebSocket handler for live reload.
//!
//! Registers each connection with the [`Notifier`] and forwards reload
//! instructions to the browser.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Serialize;

use super::notifier::{ClientMessage, Notifier};

/// Message sent to browsers when watched files change.
#[derive(Clone, Copy, Debug, Serialize)]
pub(crate) struct ReloadEvent {
    #[serde(rename = "type")]
    event_type: &'static str,
}

impl ReloadEvent {
    pub(crate) const RELOAD: Self = Self {
        event_type: "reload",
    };
}

/// Handle WebSocket upgrade for live reload.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(notifier): State<Arc<Notifier>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, notifier))
}

/// Handle an established WebSocket connection.
async fn handle_socket(mut socket: WebSocket, notifier: Arc<Notifier>) {
    let (id, mut messages) = notifier.connect();
    tracing::info!(client = id, total = notifier.client_count(), "Client connected");

    loop {
        tokio::select! {
            message = messages.recv() => {
                match message {
                    Some(ClientMessage::Reload) => {
                        let payload = match serde_json::to_string(&ReloadEvent::RELOAD) {
                            Ok(payload) => payload,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to encode reload event");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(ClientMessage::Close) | None => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            // Client messages are not part of the protocol; only watch for close.
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    notifier.disconnect(id);
    tracing::info!(client = id, total = notifier.client_count(), "Client disconnected");
}
