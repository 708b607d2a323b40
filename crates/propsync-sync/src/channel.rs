// crates/propsync-sync/src/channel.rs
// ============================================================================
// Module: PropSync Client Sync Channel
// Description: Client-side realtime channel with bounded auto-reconnect.
// Purpose: Broadcast confirmed mutations and apply frames from other clients.
// Dependencies: propsync-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! A [`SyncChannel`] owns one connection to the relay at a time. Outbound
//! frames go through an unbounded writer task; inbound frames are parsed,
//! echo-suppressed by client identifier, and dispatched to registered
//! handlers keyed `entityType:messageType`. While disconnected, broadcasts
//! for a given entity are coalesced last-write-wins and stay queued until
//! an explicit [`SyncChannel::flush_queued`] pass while connected. A
//! dropped connection triggers bounded
//! exponential-backoff reconnection; once exhausted the channel enters a
//! terminal error state that only a manual [`SyncChannel::reconnect`]
//! leaves. Connection state transitions are reported to listeners
//! registered via [`SyncChannel::on_state_change`]; [`bind_store`] uses
//! them to keep a store's sync status in step with the connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use propsync_core::ChangeNotifier;
use propsync_core::ClientId;
use propsync_core::EntityChange;
use propsync_core::EntityId;
use propsync_core::EntityKind;
use propsync_core::EntityStore;
use tokio::sync::mpsc;

use crate::message::MessageType;
use crate::message::SyncMessage;
use crate::transport::SyncError;
use crate::transport::SyncSink;
use crate::transport::SyncStream;
use crate::transport::SyncTransport;

// ============================================================================
// SECTION: Connection State
// ============================================================================

/// Lifecycle state of the channel's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The connection is live.
    Connected,
    /// Reconnection was exhausted; a manual reconnect is required.
    SyncError,
}

/// Registered frame handler.
type Handler = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

/// Registered connection state listener.
type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Default bounded reconnect attempts.
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default backoff base delay.
const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Sync Channel
// ============================================================================

/// Mutable channel state behind one lock.
struct ChannelState {
    /// Current connection lifecycle state.
    connection: ConnectionState,
    /// Writer-task sender for the live connection, when connected.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Frames queued while disconnected, last write wins per entity.
    queued: HashMap<EntityId, SyncMessage>,
}

/// Client-side realtime sync channel.
///
/// # Invariants
/// - At most one live connection exists at a time; stale reader tasks are
///   fenced out by a connection generation counter.
/// - Frames originating from this channel's own `client_id` are never
///   dispatched to handlers.
pub struct SyncChannel {
    /// Transport used to open connections.
    transport: Arc<dyn SyncTransport>,
    /// This connection's identifier, used for echo suppression.
    client_id: ClientId,
    /// Bounded reconnect attempts before the terminal error state.
    max_reconnect_attempts: u32,
    /// Backoff base delay, doubled per failed attempt.
    base_delay: Duration,
    /// Connection state, outbound sender, and offline queue.
    state: Mutex<ChannelState>,
    /// Handlers keyed `entityType:messageType`.
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
    /// Listeners invoked after each connection state change.
    state_listeners: Mutex<Vec<StateListener>>,
    /// Connection generation, bumped per successful connect.
    generation: AtomicU64,
}

impl SyncChannel {
    /// Creates a channel with default reconnect settings and a random
    /// client identifier.
    #[must_use]
    pub fn new(transport: Arc<dyn SyncTransport>) -> Arc<Self> {
        Self::with_settings(transport, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY)
    }

    /// Creates a channel with explicit reconnect settings.
    ///
    /// Zero attempts is clamped to one.
    #[must_use]
    pub fn with_settings(
        transport: Arc<dyn SyncTransport>,
        max_reconnect_attempts: u32,
        base_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            client_id: ClientId::random(),
            max_reconnect_attempts: max_reconnect_attempts.max(1),
            base_delay,
            state: Mutex::new(ChannelState {
                connection: ConnectionState::Disconnected,
                outbound: None,
                queued: HashMap::new(),
            }),
            handlers: Mutex::new(HashMap::new()),
            state_listeners: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Returns this channel's client identifier.
    #[must_use]
    pub const fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.lock_state().connection
    }

    /// Returns the number of frames queued while disconnected.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.lock_state().queued.len()
    }

    /// Locks the channel state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a handler for one entity kind and message type.
    pub fn on<F>(&self, kind: EntityKind, message_type: MessageType, handler: F)
    where
        F: Fn(&SyncMessage) + Send + Sync + 'static,
    {
        let key = format!("{}:{}", kind.as_str(), message_type.as_str());
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Registers a listener invoked after each connection state change.
    ///
    /// Listeners fire outside the channel lock, so they may call back
    /// into the channel.
    pub fn on_state_change<F>(&self, listener: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.state_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Invokes every state listener with the new state.
    fn notify_state(&self, state: ConnectionState) {
        let listeners: Vec<StateListener> = self
            .state_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(state);
        }
    }

    /// Moves to a connection state and notifies listeners when it changed.
    fn set_connection(&self, next: ConnectionState) {
        let changed = {
            let mut state = self.lock_state();
            let changed = state.connection != next;
            state.connection = next;
            changed
        };
        if changed {
            self.notify_state(next);
        }
    }

    /// Connects with bounded exponential backoff.
    ///
    /// Queued frames are not flushed automatically; call
    /// [`Self::flush_queued`] after a successful connect.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ReconnectExhausted`] once every attempt has
    /// failed; the channel is then in [`ConnectionState::SyncError`].
    pub async fn connect(self: &Arc<Self>) -> Result<(), SyncError> {
        for attempt in 1..=self.max_reconnect_attempts {
            self.set_connection(ConnectionState::Connecting);
            match self.transport.connect().await {
                Ok((sink, stream)) => {
                    self.start_io(sink, stream);
                    return Ok(());
                }
                Err(error) => {
                    let _ = writeln!(
                        std::io::stderr(),
                        "sync connect attempt {attempt}/{} failed: {error}",
                        self.max_reconnect_attempts
                    );
                    if attempt < self.max_reconnect_attempts {
                        tokio::time::sleep(backoff_delay(self.base_delay, attempt)).await;
                    }
                }
            }
        }
        self.set_connection(ConnectionState::SyncError);
        Err(SyncError::ReconnectExhausted {
            attempts: self.max_reconnect_attempts,
        })
    }

    /// Manually retries from the terminal error state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ReconnectExhausted`] when the retry round also
    /// fails.
    pub async fn reconnect(self: &Arc<Self>) -> Result<(), SyncError> {
        self.set_connection(ConnectionState::Disconnected);
        self.connect().await
    }

    /// Closes the current connection without reconnecting.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let changed = {
            let mut state = self.lock_state();
            state.outbound = None;
            let changed = state.connection != ConnectionState::Disconnected;
            state.connection = ConnectionState::Disconnected;
            changed
        };
        if changed {
            self.notify_state(ConnectionState::Disconnected);
        }
    }

    /// Broadcasts a frame, queueing it per entity while disconnected.
    ///
    /// Frames without an entity identifier are dropped when no connection
    /// is live.
    pub fn broadcast(&self, message: &SyncMessage) {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(error) => {
                let _ = writeln!(std::io::stderr(), "sync frame serialization failed: {error}");
                return;
            }
        };
        let mut state = self.lock_state();
        let delivered = state
            .outbound
            .as_ref()
            .is_some_and(|sender| sender.send(text).is_ok());
        if !delivered
            && let Some(entity_id) = message.entity_id.clone()
        {
            state.queued.insert(entity_id, message.clone());
        }
    }

    /// Flushes queued frames to the live connection; no-op while
    /// disconnected. Returns the number of frames sent.
    pub fn flush_queued(&self) -> usize {
        let mut state = self.lock_state();
        let Some(sender) = state.outbound.clone() else {
            return 0;
        };
        let queued = std::mem::take(&mut state.queued);
        let mut sent = 0_usize;
        for (entity_id, message) in queued {
            let delivered = serde_json::to_string(&message)
                .is_ok_and(|text| sender.send(text).is_ok());
            if delivered {
                sent += 1;
            } else {
                state.queued.insert(entity_id, message);
            }
        }
        sent
    }

    /// Installs a fresh connection and spawns its writer and reader tasks.
    fn start_io(
        self: &Arc<Self>,
        mut sink: Box<dyn SyncSink>,
        mut stream: Box<dyn SyncStream>,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        {
            let mut state = self.lock_state();
            state.outbound = Some(sender);
            state.connection = ConnectionState::Connected;
        }
        self.notify_state(ConnectionState::Connected);
        tokio::spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
        });
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(text) = stream.next_text().await {
                channel.handle_frame(&text);
            }
            channel.handle_disconnect(generation).await;
        });
    }

    /// Parses and dispatches one inbound frame.
    fn handle_frame(&self, text: &str) {
        let message: SyncMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(error) => {
                let _ = writeln!(std::io::stderr(), "sync frame rejected: {error}");
                return;
            }
        };
        if message.client_id == self.client_id {
            return;
        }
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.handler_key())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&message);
        }
    }

    /// Reacts to a dropped connection by auto-reconnecting, unless the
    /// drop belongs to a superseded connection.
    async fn handle_disconnect(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.lock_state();
            if self.generation.load(Ordering::SeqCst) != generation
                || state.connection != ConnectionState::Connected
            {
                return;
            }
            state.outbound = None;
            state.connection = ConnectionState::Disconnected;
        }
        self.notify_state(ConnectionState::Disconnected);
        if let Err(error) = self.connect().await {
            let _ = writeln!(std::io::stderr(), "sync auto-reconnect gave up: {error}");
        }
    }
}

/// Backoff delay for a one-based attempt number: base doubled per prior
/// failure.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

// ============================================================================
// SECTION: Store Integration
// ============================================================================

/// Store-facing notifier that broadcasts confirmed mutations.
pub struct ChannelNotifier {
    /// Channel the notifier broadcasts through.
    channel: Arc<SyncChannel>,
}

impl ChannelNotifier {
    /// Creates a notifier for the given channel.
    #[must_use]
    pub const fn new(channel: Arc<SyncChannel>) -> Self {
        Self {
            channel,
        }
    }
}

impl ChangeNotifier for ChannelNotifier {
    fn notify(&self, change: &EntityChange) {
        let message = SyncMessage::from_change(change, self.channel.client_id());
        self.channel.broadcast(&message);
    }
}

/// Routes inbound create, update, and delete frames for the store's
/// entity kind into [`EntityStore::apply_external`], and mirrors the
/// channel's connection state into the store's sync status.
///
/// Conflicts surfaced while applying a remote change are drained and
/// reported to stderr; the remote row has already won.
pub fn bind_store(channel: &Arc<SyncChannel>, store: &Arc<EntityStore>) {
    for message_type in [MessageType::Create, MessageType::Update, MessageType::Delete] {
        let store = Arc::clone(store);
        channel.on(store.kind(), message_type, move |message| {
            let Some(change) = message.to_change() else {
                return;
            };
            if let Err(error) = store.apply_external(&change) {
                let _ = writeln!(std::io::stderr(), "external change rejected: {error}");
                return;
            }
            for conflict in store.take_conflicts() {
                let _ = writeln!(
                    std::io::stderr(),
                    "concurrent edit on {} {}: local v{} vs remote v{}",
                    conflict.entity_kind.as_str(),
                    conflict.entity_id,
                    conflict.local_version,
                    conflict.remote_version
                );
            }
        });
    }
    let store = Arc::clone(store);
    channel.on_state_change(move |state| match state {
        ConnectionState::Connected => store.set_offline(false),
        ConnectionState::Disconnected | ConnectionState::SyncError => store.set_offline(true),
        ConnectionState::Connecting => {}
    });
}
