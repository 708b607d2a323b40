// crates/propsync-sync/src/transport.rs
// ============================================================================
// Module: PropSync Sync Transports
// Description: Transport seam with WebSocket and in-memory implementations.
// Purpose: Decouple the sync channel from the wire it runs over.
// Dependencies: async-trait, futures-util, thiserror, tokio, tokio-tungstenite
// ============================================================================

//! ## Overview
//! A transport produces one duplex text connection per `connect` call,
//! split into a send half and a receive half so the channel can pump both
//! concurrently. The WebSocket implementation wraps `tokio-tungstenite`;
//! the in-memory implementation scripts connection outcomes for channel
//! tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;

use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::StreamExt;
use futures_util::stream::SplitSink;
use futures_util::stream::SplitStream;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Realtime transport and channel errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Connection attempt failed.
    #[error("sync connect failed: {0}")]
    Connect(String),
    /// Frame send failed.
    #[error("sync send failed: {0}")]
    Send(String),
    /// Connection is closed.
    #[error("sync connection closed")]
    Closed,
    /// Bounded reconnect gave up; a manual reconnect is required.
    #[error("sync reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Inbound frame failed validation.
    #[error("sync frame parse failed: {0}")]
    Parse(String),
}

// ============================================================================
// SECTION: Transport Seam
// ============================================================================

/// Send half of one duplex text connection.
#[async_trait]
pub trait SyncSink: Send {
    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the connection is closed or the write
    /// fails.
    async fn send(&mut self, text: String) -> Result<(), SyncError>;
}

/// Receive half of one duplex text connection.
#[async_trait]
pub trait SyncStream: Send {
    /// Receives the next text frame; `None` means the connection closed.
    async fn next_text(&mut self) -> Option<String>;
}

/// Factory for duplex text connections.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Opens one connection, split into send and receive halves.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Connect`] when the connection cannot be
    /// established.
    async fn connect(&self) -> Result<(Box<dyn SyncSink>, Box<dyn SyncStream>), SyncError>;
}

// ============================================================================
// SECTION: WebSocket Transport
// ============================================================================

/// WebSocket transport backed by `tokio-tungstenite`.
pub struct WebSocketTransport {
    /// WebSocket URL (`ws://host:port/ws`).
    url: String,
}

impl WebSocketTransport {
    /// Creates a transport for the given WebSocket URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
        }
    }
}

/// Send half of a live WebSocket.
struct WebSocketSink {
    /// Underlying message sink.
    sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
}

/// Receive half of a live WebSocket.
struct WebSocketReceiver {
    /// Underlying message stream.
    stream: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

#[async_trait]
impl SyncTransport for WebSocketTransport {
    async fn connect(&self) -> Result<(Box<dyn SyncSink>, Box<dyn SyncStream>), SyncError> {
        let (socket, _response) = connect_async(&self.url)
            .await
            .map_err(|err| SyncError::Connect(err.to_string()))?;
        let (sink, stream) = socket.split();
        Ok((
            Box::new(WebSocketSink {
                sink,
            }),
            Box::new(WebSocketReceiver {
                stream,
            }),
        ))
    }
}

#[async_trait]
impl SyncSink for WebSocketSink {
    async fn send(&mut self, text: String) -> Result<(), SyncError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|err| SyncError::Send(err.to_string()))
    }
}

#[async_trait]
impl SyncStream for WebSocketReceiver {
    async fn next_text(&mut self) -> Option<String> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    }
}

// ============================================================================
// SECTION: Memory Transport
// ============================================================================

/// One scripted connection outcome.
enum ConnectOutcome {
    /// The attempt fails with this message.
    Failure(String),
    /// The attempt succeeds with these halves.
    Connection(Box<dyn SyncSink>, Box<dyn SyncStream>),
}

/// In-memory transport with scripted connection outcomes.
///
/// Each `connect` call consumes the next scripted outcome; an empty
/// script fails the attempt.
#[derive(Default)]
pub struct MemoryTransport {
    /// Scripted outcomes, consumed front first.
    outcomes: Mutex<VecDeque<ConnectOutcome>>,
}

/// Test-side handle to one scripted in-memory connection.
pub struct MemoryPeer {
    /// Sender feeding frames to the client; `None` once closed.
    to_client: Option<mpsc::UnboundedSender<String>>,
    /// Frames the client sent.
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Delivers a frame to the client side; returns false once closed.
    pub fn send(&self, text: &str) -> bool {
        self.to_client.as_ref().is_some_and(|tx| tx.send(text.to_string()).is_ok())
    }

    /// Awaits the next frame the client sent.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Returns the next already-sent client frame without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Closes the connection from the peer side.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}

/// Send half of an in-memory connection.
struct MemorySink {
    /// Frames the client sends to the peer.
    tx: mpsc::UnboundedSender<String>,
}

/// Receive half of an in-memory connection.
struct MemoryReceiver {
    /// Frames the peer sends to the client.
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl SyncSink for MemorySink {
    async fn send(&mut self, text: String) -> Result<(), SyncError> {
        self.tx.send(text).map_err(|_| SyncError::Closed)
    }
}

#[async_trait]
impl SyncStream for MemoryReceiver {
    async fn next_text(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl MemoryTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the script, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ConnectOutcome>> {
        self.outcomes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts one failing connection attempt.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock().push_back(ConnectOutcome::Failure(message.into()));
    }

    /// Scripts one successful connection and returns its peer handle.
    pub fn push_connection(&self) -> MemoryPeer {
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        let (from_client_tx, from_client_rx) = mpsc::unbounded_channel();
        self.lock().push_back(ConnectOutcome::Connection(
            Box::new(MemorySink {
                tx: from_client_tx,
            }),
            Box::new(MemoryReceiver {
                rx: to_client_rx,
            }),
        ));
        MemoryPeer {
            to_client: Some(to_client_tx),
            from_client: from_client_rx,
        }
    }
}

#[async_trait]
impl SyncTransport for MemoryTransport {
    async fn connect(&self) -> Result<(Box<dyn SyncSink>, Box<dyn SyncStream>), SyncError> {
        match self.lock().pop_front() {
            Some(ConnectOutcome::Connection(sink, stream)) => Ok((sink, stream)),
            Some(ConnectOutcome::Failure(message)) => Err(SyncError::Connect(message)),
            None => Err(SyncError::Connect("no connection available".to_string())),
        }
    }
}
