//! Manages the WebSocket connection lifecycle for one client.

use super::conversation::Conversation;
use crate::state::AppState;
use advisory_core::{ClientEvent, ServerEvent};
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one connection until either side closes it.
///
/// Frames are handled strictly in arrival order, so replies go out in the
/// order their requests came in.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id);
    info!("New WebSocket connection.");

    let (mut socket_tx, mut socket_rx) = socket.split();
    let mut conversation = Conversation::new(state);

    while let Some(msg_result) = socket_rx.next().await {
        let text = match msg_result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Client sent close frame.");
                break;
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame; audio travels as base64 in voice_data.");
                continue;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        };

        let event = match ClientEvent::parse(&text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Rejecting malformed frame");
                let reply = ServerEvent::Error {
                    message: format!("Invalid message: {e}"),
                };
                if send_msg(&mut socket_tx, reply).await.is_err() {
                    break;
                }
                continue;
            }
        };
        debug!(event = event.name(), "Client event");

        if let Some(ack) = conversation.acknowledge(&event) {
            if send_msg(&mut socket_tx, ack).await.is_err() {
                break;
            }
        }
        let outcome = conversation.handle(event).await;
        if let Err(e) = send_all(&mut socket_tx, outcome.events).await {
            error!(error = ?e, "Failed to write to client.");
            break;
        }
        if outcome.close {
            let goodbye = Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "session ended".into(),
            }));
            let _ = socket_tx.send(goodbye).await;
            break;
        }
    }
    info!("WebSocket connection closed.");
}

async fn send_all(socket_tx: &mut SplitSink<WebSocket, Message>, events: Vec<ServerEvent>) -> Result<()> {
    for event in events {
        send_msg(socket_tx, event).await?;
    }
    Ok(())
}

/// Serializes and sends one `ServerEvent` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerEvent,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
