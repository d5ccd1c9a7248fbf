//! Background WebSocket connection loop with fixed-delay auto-reconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::websocket::ServerMessage;

use super::events::{ConnectionState, DisconnectReason, SocketEvent};

const COMMAND_BUFFER_SIZE: usize = 4;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum Command {
    Disconnect,
}

/// Handle to the socket task. Dropping it also ends the task: the command
/// channel closes and the loop treats that as a disconnect request.
pub struct SocketHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SocketHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for callers that want to await state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// True once the connection task has reached a terminal state. A finished
    /// handle will never reconnect on its own.
    pub fn is_finished(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    /// Ask the task to close the socket and exit. A no-op if the task has
    /// already finished.
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect).await;
    }
}

/// Spawn the connection loop for an authenticated session.
pub(crate) fn spawn(
    ws_url: String,
    token: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    event_tx: mpsc::Sender<SocketEvent>,
) -> SocketHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let url = format!("{}?token={}", ws_url, token);
    tokio::spawn(connection_loop(
        url,
        reconnect_delay,
        connect_timeout,
        state_tx,
        event_tx,
        cmd_rx,
    ));

    SocketHandle { cmd_tx, state_rx }
}

async fn connection_loop(
    url: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::Sender<SocketEvent>,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        tracing::debug!(url = %url.split('?').next().unwrap_or(""), "Connecting presence socket");

        let attempt = tokio::select! {
            res = timeout(connect_timeout, connect_async(&url)) => res,
            _ = cmd_rx.recv() => {
                // Disconnect requested (or handle dropped) mid-handshake
                state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }
        };

        match attempt {
            Ok(Ok((ws_stream, _))) => {
                state_tx.send_replace(ConnectionState::Connected);
                let _ = event_tx.send(SocketEvent::Connected).await;

                let reason = run_connection(ws_stream, &event_tx, &mut cmd_rx).await;

                let terminal = matches!(
                    reason,
                    DisconnectReason::Requested | DisconnectReason::ServerClosed
                );
                if terminal {
                    // Mark the handle finished before the event goes out, so a
                    // caller reacting to it already sees this task as done.
                    cmd_rx.close();
                }

                state_tx.send_replace(ConnectionState::Disconnected);
                let _ = event_tx.send(SocketEvent::Disconnected(reason)).await;

                if terminal {
                    return;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Presence socket connect failed");
                state_tx.send_replace(ConnectionState::Disconnected);
                let _ = event_tx
                    .send(SocketEvent::Disconnected(DisconnectReason::Error(
                        e.to_string(),
                    )))
                    .await;
            }
            Err(_elapsed) => {
                tracing::warn!(timeout_secs = connect_timeout.as_secs(), "Presence socket connect timed out");
                state_tx.send_replace(ConnectionState::Disconnected);
                let _ = event_tx
                    .send(SocketEvent::Disconnected(DisconnectReason::Error(
                        "connection attempt timed out".to_string(),
                    )))
                    .await;
            }
        }

        // Exactly one reconnection attempt is scheduled per failure, after a
        // fixed delay. The loop gives unbounded retries overall.
        tracing::info!(
            delay_secs = reconnect_delay.as_secs_f64(),
            "Reconnecting presence socket after delay"
        );
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = cmd_rx.recv() => {
                state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

/// Drive one established connection until it ends, returning why.
async fn run_connection(
    mut ws: WsStream,
    event_tx: &mpsc::Sender<SocketEvent>,
    cmd_rx: &mut mpsc::Receiver<Command>,
) -> DisconnectReason {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                // Disconnect command, or handle dropped: close cleanly so the
                // server removes our presence record immediately.
                let _ = cmd;
                let _ = ws.send(WsMessage::Close(None)).await;
                return DisconnectReason::Requested;
            }
            frame = ws.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(ServerMessage::PresenceUpdate { online }) => {
                            let _ = event_tx.send(SocketEvent::PresenceUpdate(online)).await;
                        }
                        Ok(ServerMessage::Error { code, message }) => {
                            tracing::warn!(code = %code, message = %message, "Server error on presence socket");
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Unrecognized message on presence socket");
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    // Liveness probe from the server; answering keeps our
                    // presence record from being evicted.
                    if ws.send(WsMessage::Pong(payload)).await.is_err() {
                        return DisconnectReason::Error("failed to answer ping".to_string());
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    tracing::info!("Server closed presence socket");
                    return DisconnectReason::ServerClosed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Presence socket error");
                    return DisconnectReason::Error(e.to_string());
                }
                None => {
                    return DisconnectReason::Error("connection ended unexpectedly".to_string());
                }
            }
        }
    }
}
