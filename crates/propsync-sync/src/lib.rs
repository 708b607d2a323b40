// crates/propsync-sync/src/lib.rs
// ============================================================================
// Module: PropSync Sync Library
// Description: Realtime sync channel, broadcast hub, and transports.
// Purpose: Propagate confirmed mutations between connected clients.
// Dependencies: propsync-core, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! The realtime layer relays confirmed mutations between clients with
//! at-most-once, best-effort delivery. The client-side [`SyncChannel`]
//! owns a per-connection client identifier for echo suppression, queues
//! undeliverable broadcasts per entity (last write wins), and reconnects
//! with bounded exponential backoff before entering a terminal error state
//! that requires a manual reconnect. The server-side [`SyncHub`] is a
//! naive relay: every inbound frame goes verbatim to every other
//! connection. Transports sit behind the [`SyncTransport`] seam.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod channel;
pub mod hub;
pub mod message;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use channel::ChannelNotifier;
pub use channel::ConnectionState;
pub use channel::SyncChannel;
pub use channel::bind_store;
pub use hub::SyncHub;
pub use message::MessageType;
pub use message::SyncMessage;
pub use transport::MemoryPeer;
pub use transport::MemoryTransport;
pub use transport::SyncError;
pub use transport::SyncSink;
pub use transport::SyncStream;
pub use transport::SyncTransport;
pub use transport::WebSocketTransport;
