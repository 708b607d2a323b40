// crates/propsync-server/src/ws.rs
// ============================================================================
// Module: PropSync WebSocket Relay
// Description: Upgrades connections into the broadcast hub.
// Purpose: Fan every inbound text frame out to every other connection.
// Dependencies: axum, futures-util, propsync-sync, tokio
// ============================================================================

//! ## Overview
//! `/ws` upgrades the connection and registers it with the [`SyncHub`].
//! A writer task drains the hub's outbound queue into the socket while the
//! read loop relays inbound text frames through
//! [`SyncHub::broadcast_from`], which excludes the origin. The connection
//! is deregistered when either side closes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::response::Response;
use futures_util::SinkExt;
use futures_util::StreamExt;
use propsync_sync::SyncHub;

use crate::router::AppState;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// `GET /ws`: joins the broadcast relay.
pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| relay_connection(socket, state.hub))
}

/// Pumps one relay connection until either side closes.
async fn relay_connection(socket: WebSocket, hub: Arc<SyncHub>) {
    let (connection_id, mut outbound) = hub.register();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                let _ = hub.broadcast_from(connection_id, text.as_str());
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    hub.disconnect(connection_id);
    writer.abort();
}
