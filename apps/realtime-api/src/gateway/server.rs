//! WebSocket upgrade handler and per-connection event loop.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time;

use crate::auth::middleware::AuthUser;
use crate::AppState;

use super::session::{ConnectionId, GatewaySession, Outbound, OutboundReceiver};

/// Interval between server pings.
const PING_INTERVAL_SECS: u64 = 30;
/// A connection with no inbound traffic (pongs included) for this long is closed.
const IDLE_TIMEOUT_SECS: u64 = 90;
/// How long the writer may take to flush queued events after the reader stops.
const WRITER_DRAIN_SECS: u64 = 5;

const CLOSE_NORMAL: u16 = 1000;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

/// Authentication runs before the upgrade: a rejected handshake never opens
/// a socket and never reaches the registry.
async fn ws_upgrade(
    user: AuthUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, user))
}

async fn handle_connection(socket: WebSocket, state: AppState, user: AuthUser) {
    let (ws_tx, mut ws_rx) = socket.split();

    let (outbound, outbound_rx) = Outbound::channel(state.config.outbound_buffer);
    let session = GatewaySession::new(user.user_id, user.display_name, outbound);
    let gateway = state.gateway.clone();
    gateway.connect(&session);

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = session.user_id,
        "socket connected"
    );

    let mut writer = tokio::spawn(writer_task(
        ws_tx,
        outbound_rx,
        session.connection_id.clone(),
    ));

    // Frames from one connection are handled strictly in arrival order.
    let idle_timeout = Duration::from_secs(IDLE_TIMEOUT_SECS);
    loop {
        let msg = match time::timeout(idle_timeout, ws_rx.next()).await {
            Ok(msg) => msg,
            Err(_) => {
                tracing::debug!(connection_id = %session.connection_id, "idle timeout, closing");
                break;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => gateway.handle_frame(&session, text.as_str()).await,
            Some(Ok(Message::Binary(_)))
            | Some(Ok(Message::Ping(_)))
            | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                break;
            }
        }
    }

    gateway.disconnect(&session.connection_id);
    let connection_id = session.connection_id.clone();
    // Dropping the last sender lets the writer flush and send Close.
    drop(session);

    if time::timeout(Duration::from_secs(WRITER_DRAIN_SECS), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }

    tracing::info!(connection_id = %connection_id, "socket disconnected");
}

/// Drains the connection's outbound queue into the socket and keeps it alive
/// with periodic pings.
async fn writer_task(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: OutboundReceiver,
    connection_id: ConnectionId,
) {
    let mut ping = time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Connection closed").await;
                    break;
                };
                let json = match serde_json::to_string(event.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(?e, connection_id = %connection_id, event = event.t, "failed to encode event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(connection_id = %connection_id, "writer stopped");
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
