//! services/api/src/web/ws_handler.rs
//!
//! The entry point and control loop for a presence WebSocket connection.
//! Registers the user with the presence registry, forwards registry events to
//! the socket, and drives the registry from client messages.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use chrono::Utc;
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Extension(user_id): Extension<Uuid>, // from auth middleware
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: AppState, user_id: Uuid) {
    info!(%user_id, "new presence connection");

    let (sender, mut receiver) = socket.split();
    let ws_sender = Arc::new(Mutex::new(sender));

    // --- 1. Load the friend set. Fail closed: a connection that cannot know
    //        its friend set must not run with a partial one silently.
    let friend_ids = match app_state.db.friend_ids(user_id).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(%user_id, error = %e, "failed to load friend list; closing connection");
            send_json(
                &ws_sender,
                &ServerMessage::Error {
                    message: "Failed to load friend list.".to_string(),
                },
            )
            .await;
            return;
        }
    };

    // --- 2. Register with the presence registry (friends get "online").
    let mut events = app_state.presence.connect(user_id, friend_ids.clone()).await;
    if !send_json(&ws_sender, &ServerMessage::Connected { user_id }).await {
        app_state.presence.disconnect(user_id).await;
        return;
    }

    // --- 3. Forward registry events to the socket.
    let forward_task = {
        let ws_sender = ws_sender.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !send_json(&ws_sender, &ServerMessage::from(event)).await {
                    break;
                }
            }
        })
    };

    // --- 4. Main receive loop.
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(%user_id, error = %e, "websocket receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(&app_state, &ws_sender, user_id, &friend_ids, client_msg)
                        .await;
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "unparseable client message");
                    send_json(
                        &ws_sender,
                        &ServerMessage::Error {
                            message: "Unrecognized message.".to_string(),
                        },
                    )
                    .await;
                }
            },
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames have no meaning here.
            _ => {}
        }
    }

    // --- 5. Teardown (friends get "offline").
    app_state.presence.disconnect(user_id).await;
    forward_task.abort();
    info!(%user_id, "presence connection closed");
}

async fn handle_client_message(
    app_state: &AppState,
    ws_sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    user_id: Uuid,
    friend_ids: &[Uuid],
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::StartStudying { subject } => {
            let subject = subject
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| studycircle_core::ledger::DEFAULT_SUBJECT.to_string());
            app_state
                .presence
                .start_activity(user_id, subject, Utc::now())
                .await;
        }
        ClientMessage::StopStudying => {
            let duration_ms = app_state.presence.stop_activity(user_id, Utc::now()).await;
            send_json(ws_sender, &ServerMessage::StoppedStudying { duration_ms }).await;
        }
        ClientMessage::OnlineFriends => {
            let user_ids = app_state.presence.online_friends(friend_ids).await;
            send_json(ws_sender, &ServerMessage::OnlineFriends { user_ids }).await;
        }
    }
}

/// Serializes and sends one message; returns false once the socket is gone.
async fn send_json(
    ws_sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    msg: &ServerMessage,
) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "failed to serialize server message");
            return true;
        }
    };
    ws_sender
        .lock()
        .await
        .send(Message::Text(json.into()))
        .await
        .is_ok()
}
