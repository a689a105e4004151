use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use duocall_protocol::ClientMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Connection ids are per physical connection; a reconnecting
    // participant always gets a fresh one.
    let connection_id = Uuid::new_v4();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.relay.register(connection_id, tx).await;

    tracing::info!("connection {} opened", connection_id);

    // Forward relay events to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("invalid message on connection {}: {}", connection_id, e);
                        continue;
                    }
                };

                match client_msg {
                    ClientMessage::JoinRoom {
                        room_id,
                        participant_id,
                    } => {
                        state
                            .relay
                            .join_room(connection_id, &room_id, &participant_id)
                            .await;
                    }
                    other => {
                        state.relay.forward(connection_id, other).await;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("connection {} errored: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // Network drop, explicit close and process exit all land here; the
    // relay turns it into at most one user-disconnected.
    state.relay.disconnect(connection_id).await;
    send_task.abort();

    tracing::info!("connection {} closed", connection_id);
}
