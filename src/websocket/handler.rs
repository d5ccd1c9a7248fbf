use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::server::AppState;

use super::message::SocketCommand;

const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The identity is taken from the credential token presented at connect time
/// (query parameter or Authorization header) and verified before the upgrade,
/// never trusted as a bare parameter.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = match extract_token(&query, &headers) {
        Some(t) => t,
        None => {
            return (StatusCode::UNAUTHORIZED, "Missing authentication token").into_response();
        }
    };

    let claims = match state.jwt_keys.validate(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket token validation failed");
            return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
        }
    };

    tracing::info!(identity = %claims.sub, "WebSocket upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Handle an established WebSocket connection.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state),
    fields(identity = %identity)
)]
async fn handle_socket(socket: WebSocket, state: AppState, identity: String) {
    // Channel feeding this connection's writer task
    let (tx, mut rx) = mpsc::channel::<SocketCommand>(CHANNEL_BUFFER_SIZE);

    // Registering broadcasts the updated online set to everyone, including
    // this connection (its first presence snapshot).
    let record = state.registry.register(identity.clone(), tx);
    let connection_id = record.id;

    tracing::info!(
        connection_id = %connection_id,
        identity = %identity,
        "WebSocket connection established"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: drains the command channel into the socket
    let send_task = tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SocketCommand::Message(msg) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize message");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                SocketCommand::Ping => {
                    if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                SocketCommand::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Reader: refreshes liveness and watches for the close frame
    let record_clone = record.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &record_clone) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Either side finishing tears the connection down
    tokio::select! {
        _ = send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Stale-close guard: only removes the record if this connection is still
    // the one on file for the identity.
    state.registry.unregister(&identity, connection_id);

    tracing::info!(
        connection_id = %connection_id,
        identity = %identity,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed.
fn process_message(msg: Message, record: &crate::presence::ConnectionRecord) -> bool {
    match msg {
        Message::Text(_) | Message::Binary(_) => {
            // Presence is push-only; inbound payloads just refresh liveness
            record.update_activity();
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            record.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %record.id, "Received close frame");
            false
        }
    }
}
