use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::db::models::UserId;
use crate::realtime::RealtimeEvent;
use crate::realtime::room_hub::ConnectionId;
use crate::web::AppState;
use crate::web::models::{ClientMessage, decode_token};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Resolves the user a join message refers to. A token wins over a raw id.
fn resolve_join(app_state: &AppState, message: &str) -> Option<UserId> {
    let ClientMessage::Join { user_id, token } = match serde_json::from_str(message) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognized client message.");
            return None;
        }
    };
    if let Some(token) = token {
        return match decode_token(&token, &app_state.config.jwt_secret) {
            Ok(user) => Some(user.id),
            Err(e) => {
                warn!(error = ?e, "Rejected join with an invalid token.");
                None
            }
        };
    }
    user_id.as_ref().and_then(UserId::from_json)
}

async fn send_event(socket: &mut WebSocket, event: &RealtimeEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(frame) => socket.send(Message::Text(Utf8Bytes::from(frame))).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize direct event.");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, app_state: Arc<AppState>) {
    let hub = Arc::clone(&app_state.hub);
    let mut connection = hub.connect();
    let connection_id: ConnectionId = connection.id;
    info!(connection_id = %connection_id, "WebSocket connection established.");

    loop {
        tokio::select! {
            Some(frame) = connection.room_rx.recv() => {
                if socket.send(Message::Text(Utf8Bytes::from(frame))).await.is_err() {
                    debug!(connection_id = %connection_id, "Error sending room event. Breaking loop.");
                    break;
                }
            }
            global = connection.global_rx.recv() => {
                match global {
                    Ok(frame) => {
                        if socket.send(Message::Text(Utf8Bytes::from(frame))).await.is_err() {
                            debug!(connection_id = %connection_id, "Error sending global event. Breaking loop.");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection_id = %connection_id, skipped, "Connection lagged behind global events.");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };
                match msg {
                    Message::Text(t) => {
                        if t.as_str() == "ping" {
                            if socket.send(Message::Text(Utf8Bytes::from("pong"))).await.is_err() {
                                break;
                            }
                            continue;
                        }
                        match resolve_join(&app_state, t.as_str()) {
                            Some(user) if hub.join(connection_id, user) => {
                                let joined = RealtimeEvent::Joined { user_id: user };
                                if !send_event(&mut socket, &joined).await {
                                    break;
                                }
                            }
                            _ => debug!(connection_id = %connection_id, "Join not completed."),
                        }
                    }
                    Message::Ping(p) => {
                        if socket.send(Message::Pong(p)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => {
                        debug!(connection_id = %connection_id, "Received close message. Closing connection.");
                        break;
                    }
                    Message::Binary(_) | Message::Pong(_) => {}
                }
            }
        }
    }

    hub.leave_all(connection_id);
    info!(connection_id = %connection_id, "WebSocket connection closed.");
}
