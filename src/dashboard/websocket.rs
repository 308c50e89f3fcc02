//! WebSocket handler for live updates

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use super::broadcast::Subscription;
use super::protocol::{ClientMessage, ServerMessage};
use super::server::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle one subscriber connection until either side closes.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Subscription {
        id,
        receiver: mut updates,
    } = state.connections.subscribe().await;
    tracing::info!(subscriber = id, "WebSocket client connected");

    let hello = ServerMessage::Connected {
        version: crate::VERSION.to_string(),
    };
    if sender.send(Message::Text(hello.to_json())).await.is_err() {
        state.connections.unsubscribe(id).await;
        return;
    }

    // Replies to this client only (pongs) go through a private channel so
    // the socket has a single writer.
    let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();

    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(text) = updates.recv() => text,
                Some(text) = replies.recv() => text,
                else => break,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => {
                        if reply_tx.send(ServerMessage::Pong.to_json()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(subscriber = id, error = %e, "Ignoring client message");
                    }
                },
                Message::Close(_) => break,
                // Protocol-level pings are answered by axum.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.connections.unsubscribe(id).await;
    tracing::info!(subscriber = id, "WebSocket client disconnected");
}
