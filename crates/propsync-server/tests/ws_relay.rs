//! WebSocket relay tests for propsync-server.
// crates/propsync-server/tests/ws_relay.rs
// =============================================================================
// Module: WebSocket Relay Tests
// Description: Frame fan-out behavior over live upgraded connections.
// Purpose: Verify /ws relays frames to every connection except the origin.
// =============================================================================

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::StreamExt;
use propsync_core::MemoryAuditLog;
use propsync_core::MemoryGateway;
use propsync_server::AppState;
use propsync_server::build_router;
use propsync_sync::SyncHub;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Spawns the server and returns its WebSocket URL.
async fn spawn_server() -> String {
    let state = AppState {
        gateway: Arc::new(MemoryGateway::new()),
        audit: Arc::new(MemoryAuditLog::new()),
        hub: Arc::new(SyncHub::new()),
    };
    let app = build_router(state, 1_048_576);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("ws://{addr}/ws")
}

/// Awaits the next text frame with a test deadline.
async fn next_text<S>(stream: &mut S) -> String
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("frame deadline")
            .expect("open stream")
            .expect("frame");
        if let Message::Text(text) = frame {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn relays_frames_to_other_connections_only() {
    let url = spawn_server().await;
    let (mut sender, _) = connect_async(&url).await.expect("sender connect");
    let (receiver_a, _) = connect_async(&url).await.expect("receiver a connect");
    let (receiver_b, _) = connect_async(&url).await.expect("receiver b connect");
    let (_a_sink, mut a_stream) = receiver_a.split();
    let (_b_sink, mut b_stream) = receiver_b.split();

    sender
        .send(Message::Text(r#"{"type":"update","entityId":"t-1"}"#.into()))
        .await
        .expect("send frame");

    assert_eq!(next_text(&mut a_stream).await, r#"{"type":"update","entityId":"t-1"}"#);
    assert_eq!(next_text(&mut b_stream).await, r#"{"type":"update","entityId":"t-1"}"#);

    // The origin must not receive its own frame back.
    let (_s_sink, mut s_stream) = sender.split();
    let echo = tokio::time::timeout(Duration::from_millis(200), s_stream.next()).await;
    assert!(echo.is_err());
}

#[tokio::test]
async fn closed_connections_stop_receiving() {
    let url = spawn_server().await;
    let (mut sender, _) = connect_async(&url).await.expect("sender connect");
    let (mut closing, _) = connect_async(&url).await.expect("closing connect");
    let (survivor, _) = connect_async(&url).await.expect("survivor connect");
    let (_sink, mut survivor_stream) = survivor.split();

    closing.close(None).await.expect("close");
    tokio::time::sleep(Duration::from_millis(100)).await;

    sender.send(Message::Text("after-close".into())).await.expect("send frame");
    assert_eq!(next_text(&mut survivor_stream).await, "after-close");
}
