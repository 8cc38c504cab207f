//! Per-client WebSocket session handling.
//!
//! Each session registers with the [`ClientRegistry`], immediately receives
//! the current vehicle status, and then translates inbound intents into
//! vehicle link calls. A separate forwarder task watches the link's status
//! channel and broadcasts every transition to all registered sessions.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use car_link::{DriveAction, LinkHandle};

use crate::messages::{ClientMessage, ServerMessage};
use crate::registry::ClientRegistry;
use crate::AppState;

const SESSION_CHANNEL_CAPACITY: usize = 32;

/// Watch the vehicle link and fan every status transition out to all open
/// sessions. Ends when the link task drops its status channel.
pub fn spawn_status_forwarder(
    link: &LinkHandle,
    registry: Arc<ClientRegistry>,
) -> JoinHandle<()> {
    let mut status_rx = link.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            registry.broadcast(ServerMessage::status(&status));
        }
    })
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

async fn handle_session(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    info!("client {} connected", id);

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(SESSION_CHANNEL_CAPACITY);
    state.registry.register(id, outbound_tx.clone());

    // Late joiners see the vehicle's actual state right away.
    let _ = outbound_tx
        .send(ServerMessage::status(&state.link.status()))
        .await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Forward queued server messages to this client's socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("failed to serialize server message: {}", e),
            }
        }
    });

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => handle_intent(&text, &outbound_tx, &state).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("client {} websocket error: {}", id, e);
                break;
            }
        }
    }

    // The session only removes itself; other clients may still be driving.
    state.registry.unregister(&id);
    send_task.abort();
    info!("client {} disconnected", id);
}

async fn handle_intent(text: &str, reply: &mpsc::Sender<ServerMessage>, state: &AppState) {
    let intent: ClientMessage = match serde_json::from_str(text) {
        Ok(intent) => intent,
        Err(e) => {
            warn!("failed to parse client message {:?}: {}", text, e);
            let _ = reply
                .send(ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                })
                .await;
            return;
        }
    };

    let result = match intent {
        // The link itself is idempotent here: while connected it re-emits
        // the current status instead of reconnecting.
        ClientMessage::Connect => state.link.connect().await,
        ClientMessage::DisconnectCar => state.link.disconnect("Client request").await,
        ClientMessage::Command { action } => match DriveAction::parse(&action) {
            Some(drive) => {
                state
                    .link
                    .send(
                        state.commands.for_action(drive),
                        format!("Client Action: {}", action),
                    )
                    .await
            }
            None => {
                warn!("unknown action received: {}", action);
                return;
            }
        },
    };

    if let Err(e) = result {
        error!("vehicle link unavailable: {}", e);
    }
}
