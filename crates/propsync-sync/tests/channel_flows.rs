//! Channel flow tests for propsync-sync.
// crates/propsync-sync/tests/channel_flows.rs
// =============================================================================
// Module: Channel Flow Tests
// Description: Broadcast, queueing, echo suppression, and reconnect flows.
// Purpose: Exercise the sync channel end to end over the memory transport.
// =============================================================================

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use propsync_core::EntityBody;
use propsync_core::EntityId;
use propsync_core::EntityKind;
use propsync_core::EntityMeta;
use propsync_core::EntityRecord;
use propsync_core::EntityStore;
use propsync_core::MemoryAuditLog;
use propsync_core::MemoryGateway;
use propsync_core::SyncStatus;
use propsync_core::TaskBody;
use propsync_core::TaskStatus;
use propsync_core::Timestamp;
use propsync_core::UserId;
use propsync_sync::ConnectionState;
use propsync_sync::MemoryTransport;
use propsync_sync::MessageType;
use propsync_sync::SyncChannel;
use propsync_sync::SyncError;
use propsync_sync::SyncMessage;
use propsync_sync::bind_store;
use serde_json::json;

/// Lets spawned reader/writer tasks drain their queues.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Builds a task record as a remote peer would store it.
fn task_record(id: &str, title: &str, version: u64) -> EntityRecord {
    let mut meta = EntityMeta::new(
        EntityId::new(id),
        UserId::new("remote-user"),
        Timestamp::from_unix_millis(1_000),
    );
    meta.version = version;
    EntityRecord {
        meta,
        body: EntityBody::Task(TaskBody {
            title: title.to_string(),
            assignee: None,
            parent_workflow_id: None,
            blocker_reason: None,
            estimated_hours: None,
            actual_hours: None,
            status: TaskStatus::Todo,
        }),
    }
}

/// Builds an update frame targeting one task.
fn update_message(channel: &SyncChannel, id: &str, title: &str, version: u64) -> SyncMessage {
    SyncMessage {
        message_type: MessageType::Update,
        entity_type: EntityKind::Task,
        entity_id: Some(EntityId::new(id)),
        data: Some(serde_json::to_value(task_record(id, title, version)).expect("serialize")),
        timestamp: Timestamp::from_unix_millis(2_000),
        client_id: channel.client_id().clone(),
        version: Some(version),
    }
}

/// Serializes a peer-originated frame for one record.
fn peer_frame(message_type: &str, record: &EntityRecord, client_id: &str) -> String {
    serde_json::to_string(&json!({
        "type": message_type,
        "entityType": "task",
        "entityId": record.meta.id.as_str(),
        "data": serde_json::to_value(record).expect("serialize"),
        "timestamp": 2_000,
        "clientId": client_id,
        "version": record.meta.version,
    }))
    .expect("serialize frame")
}

#[tokio::test]
async fn broadcast_reaches_peer_with_wire_shape() {
    let transport = Arc::new(MemoryTransport::new());
    let mut peer = transport.push_connection();
    let channel = SyncChannel::with_settings(transport, 1, Duration::ZERO);
    channel.connect().await.expect("connect");
    assert_eq!(channel.connection_state(), ConnectionState::Connected);

    channel.broadcast(&update_message(&channel, "t-1", "Replace filter", 2));
    let frame = peer.recv().await.expect("frame");
    let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(value["type"], "update");
    assert_eq!(value["entityType"], "task");
    assert_eq!(value["entityId"], "t-1");
    assert_eq!(value["clientId"], channel.client_id().as_str());
    assert_eq!(value["version"], 2);
}

#[tokio::test]
async fn offline_broadcasts_coalesce_per_entity() {
    let transport = Arc::new(MemoryTransport::new());
    let channel = SyncChannel::with_settings(Arc::<MemoryTransport>::clone(&transport), 1, Duration::ZERO);

    channel.broadcast(&update_message(&channel, "t-1", "First title", 2));
    channel.broadcast(&update_message(&channel, "t-1", "Second title", 3));
    channel.broadcast(&update_message(&channel, "t-2", "Other task", 2));
    assert_eq!(channel.queued_len(), 2);

    let mut peer = transport.push_connection();
    channel.connect().await.expect("connect");
    assert_eq!(channel.queued_len(), 2);
    assert_eq!(channel.flush_queued(), 2);
    settle().await;

    let mut versions_by_entity = std::collections::HashMap::new();
    while let Some(frame) = peer.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
        versions_by_entity.insert(
            value["entityId"].as_str().expect("id").to_string(),
            value["version"].as_u64().expect("version"),
        );
    }
    assert_eq!(versions_by_entity.len(), 2);
    assert_eq!(versions_by_entity.get("t-1"), Some(&3));
    assert_eq!(versions_by_entity.get("t-2"), Some(&2));
    assert_eq!(channel.queued_len(), 0);
}

#[tokio::test]
async fn own_frames_are_echo_suppressed() {
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let channel = SyncChannel::with_settings(transport, 1, Duration::ZERO);
    channel.connect().await.expect("connect");

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    channel.on(EntityKind::Task, MessageType::Update, move |_message| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let record = task_record("t-1", "Echo check", 2);
    let own_id = channel.client_id().as_str().to_string();
    assert!(peer.send(&peer_frame("update", &record, &own_id)));
    assert!(peer.send(&peer_frame("update", &record, "client-other")));
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handlers_dispatch_by_entity_and_message_type() {
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let channel = SyncChannel::with_settings(transport, 1, Duration::ZERO);
    channel.connect().await.expect("connect");

    let update_calls = Arc::new(AtomicU32::new(0));
    let delete_calls = Arc::new(AtomicU32::new(0));
    let update_counter = Arc::clone(&update_calls);
    let delete_counter = Arc::clone(&delete_calls);
    channel.on(EntityKind::Task, MessageType::Update, move |_message| {
        update_counter.fetch_add(1, Ordering::SeqCst);
    });
    channel.on(EntityKind::Task, MessageType::Delete, move |_message| {
        delete_counter.fetch_add(1, Ordering::SeqCst);
    });

    let record = task_record("t-1", "Dispatch check", 2);
    assert!(peer.send(&peer_frame("update", &record, "client-other")));
    settle().await;

    assert_eq!(update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(delete_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let channel = SyncChannel::with_settings(transport, 1, Duration::ZERO);
    channel.connect().await.expect("connect");

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    channel.on(EntityKind::Task, MessageType::Update, move |_message| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(peer.send("not json"));
    assert!(peer.send(r#"{"type":"upsert","entityType":"task","timestamp":1,"clientId":"x"}"#));
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(channel.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn exhausted_reconnect_is_terminal_until_manual_retry() {
    let transport = Arc::new(MemoryTransport::new());
    transport.push_failure("relay down");
    transport.push_failure("relay still down");
    let channel = SyncChannel::with_settings(Arc::<MemoryTransport>::clone(&transport), 2, Duration::ZERO);

    let error = channel.connect().await.expect_err("exhausted");
    assert_eq!(error, SyncError::ReconnectExhausted {
        attempts: 2,
    });
    assert_eq!(channel.connection_state(), ConnectionState::SyncError);

    channel.broadcast(&update_message(&channel, "t-1", "Queued offline", 2));
    assert_eq!(channel.queued_len(), 1);

    let mut peer = transport.push_connection();
    channel.reconnect().await.expect("manual reconnect");
    assert_eq!(channel.connection_state(), ConnectionState::Connected);
    assert_eq!(channel.flush_queued(), 1);
    settle().await;

    let frame = peer.try_recv().expect("flushed frame");
    let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(value["entityId"], "t-1");
    assert_eq!(channel.queued_len(), 0);
}

#[tokio::test]
async fn dropped_connection_reconnects_automatically() {
    let transport = Arc::new(MemoryTransport::new());
    let mut first = transport.push_connection();
    let mut second = transport.push_connection();
    let channel = SyncChannel::with_settings(Arc::<MemoryTransport>::clone(&transport), 3, Duration::ZERO);
    channel.connect().await.expect("connect");

    first.close();
    settle().await;
    assert_eq!(channel.connection_state(), ConnectionState::Connected);

    channel.broadcast(&update_message(&channel, "t-1", "After reconnect", 2));
    let frame = second.recv().await.expect("frame");
    assert!(frame.contains("\"t-1\""));
    assert!(first.try_recv().is_none());
}

#[tokio::test]
async fn failed_auto_reconnect_lands_in_error_state() {
    let transport = Arc::new(MemoryTransport::new());
    let mut peer = transport.push_connection();
    let channel = SyncChannel::with_settings(Arc::<MemoryTransport>::clone(&transport), 1, Duration::ZERO);
    channel.connect().await.expect("connect");

    peer.close();
    settle().await;

    assert_eq!(channel.connection_state(), ConnectionState::SyncError);
}

#[tokio::test]
async fn bound_store_applies_remote_changes_but_not_echoes() {
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let channel = SyncChannel::with_settings(transport, 1, Duration::ZERO);

    let gateway = Arc::new(MemoryGateway::default());
    let audit = Arc::new(MemoryAuditLog::default());
    let store = Arc::new(EntityStore::new(
        EntityKind::Task,
        UserId::new("local-user"),
        gateway,
        audit,
    ));
    bind_store(&channel, &store);
    channel.connect().await.expect("connect");

    let record = task_record("t-remote", "Remote create", 1);
    let own_id = channel.client_id().as_str().to_string();
    assert!(peer.send(&peer_frame("create", &task_record("t-echo", "Own echo", 1), &own_id)));
    assert!(peer.send(&peer_frame("create", &record, "client-other")));
    settle().await;

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].meta.id.as_str(), "t-remote");

    assert!(peer.send(&peer_frame("delete", &record, "client-other")));
    settle().await;
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn bound_store_mirrors_connection_state_as_sync_status() {
    let transport = Arc::new(MemoryTransport::new());
    let mut peer = transport.push_connection();
    let channel = SyncChannel::with_settings(Arc::<MemoryTransport>::clone(&transport), 1, Duration::ZERO);

    let gateway = Arc::new(MemoryGateway::default());
    let audit = Arc::new(MemoryAuditLog::default());
    let store = Arc::new(EntityStore::new(
        EntityKind::Task,
        UserId::new("local-user"),
        gateway,
        audit,
    ));
    bind_store(&channel, &store);
    channel.connect().await.expect("connect");
    assert_eq!(store.sync_status(), SyncStatus::Synced);

    peer.close();
    settle().await;
    assert_eq!(channel.connection_state(), ConnectionState::SyncError);
    assert_eq!(store.sync_status(), SyncStatus::Offline);

    let _second = transport.push_connection();
    channel.reconnect().await.expect("manual reconnect");
    assert_eq!(channel.connection_state(), ConnectionState::Connected);
    assert_eq!(store.sync_status(), SyncStatus::Synced);
}

#[tokio::test]
async fn bound_store_drains_conflicts_from_stale_remote_updates() {
    let transport = Arc::new(MemoryTransport::new());
    let peer = transport.push_connection();
    let channel = SyncChannel::with_settings(transport, 1, Duration::ZERO);

    let gateway = Arc::new(MemoryGateway::default());
    let audit = Arc::new(MemoryAuditLog::default());
    let store = Arc::new(EntityStore::new(
        EntityKind::Task,
        UserId::new("local-user"),
        gateway,
        audit,
    ));
    bind_store(&channel, &store);
    channel.connect().await.expect("connect");

    assert!(peer.send(&peer_frame("create", &task_record("t-1", "Fresh", 3), "client-a")));
    settle().await;
    assert_eq!(store.records()[0].meta.version, 3);

    assert!(peer.send(&peer_frame("update", &task_record("t-1", "Stale edit", 2), "client-b")));
    settle().await;

    let records = store.records();
    assert_eq!(records[0].meta.version, 2);
    assert!(store.conflicts().is_empty());
}
