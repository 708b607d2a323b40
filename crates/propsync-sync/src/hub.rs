// crates/propsync-sync/src/hub.rs
// ============================================================================
// Module: PropSync Broadcast Hub
// Description: Server-side relay fanning frames out to other connections.
// Purpose: Give connected clients at-most-once, best-effort frame delivery.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! The hub is a naive relay: it inspects nothing, persists nothing, and
//! forwards each inbound frame verbatim to every registered connection
//! except the origin. Connections that can no longer receive are pruned
//! during fan-out.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

// ============================================================================
// SECTION: Sync Hub
// ============================================================================

/// Server-side broadcast relay.
///
/// # Invariants
/// - Connection identifiers are unique for the lifetime of the hub.
/// - Fan-out never delivers a frame back to its origin.
#[derive(Default)]
pub struct SyncHub {
    /// Live connections by identifier.
    connections: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    /// Next connection identifier.
    next_id: AtomicU64,
}

impl SyncHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the connection table, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<String>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection and returns its identifier and outbound
    /// frame receiver.
    #[must_use]
    pub fn register(&self) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().insert(id, sender);
        (id, receiver)
    }

    /// Removes a connection.
    pub fn disconnect(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Returns the number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Relays a frame to every connection except the origin, pruning
    /// connections whose receiver is gone. Returns the delivery count.
    pub fn broadcast_from(&self, origin: u64, frame: &str) -> usize {
        let mut connections = self.lock();
        let mut closed = Vec::new();
        let mut delivered = 0_usize;
        for (&id, sender) in connections.iter() {
            if id == origin {
                continue;
            }
            if sender.send(frame.to_string()).is_ok() {
                delivered += 1;
            } else {
                closed.push(id);
            }
        }
        for id in closed {
            connections.remove(&id);
        }
        delivered
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::*;

    #[tokio::test]
    async fn relays_to_all_but_origin() {
        let hub = SyncHub::new();
        let (origin, mut origin_rx) = hub.register();
        let (_a, mut a_rx) = hub.register();
        let (_b, mut b_rx) = hub.register();

        let delivered = hub.broadcast_from(origin, "frame-1");
        assert_eq!(delivered, 2);
        assert_eq!(a_rx.recv().await.as_deref(), Some("frame-1"));
        assert_eq!(b_rx.recv().await.as_deref(), Some("frame-1"));
        assert!(origin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn prunes_closed_connections_during_fanout() {
        let hub = SyncHub::new();
        let (origin, _origin_rx) = hub.register();
        let (_live, mut live_rx) = hub.register();
        let (_gone, gone_rx) = hub.register();
        drop(gone_rx);
        assert_eq!(hub.connection_count(), 3);

        let delivered = hub.broadcast_from(origin, "frame-1");
        assert_eq!(delivered, 1);
        assert_eq!(hub.connection_count(), 2);
        assert_eq!(live_rx.recv().await.as_deref(), Some("frame-1"));
    }

    #[tokio::test]
    async fn disconnect_removes_connection() {
        let hub = SyncHub::new();
        let (origin, _origin_rx) = hub.register();
        let (other, _other_rx) = hub.register();
        hub.disconnect(other);
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.broadcast_from(origin, "frame-1"), 0);
    }
}
