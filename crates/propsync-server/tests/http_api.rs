//! HTTP API tests for propsync-server.
// crates/propsync-server/tests/http_api.rs
// =============================================================================
// Module: HTTP API Tests
// Description: Envelope, status-code, and audit behavior over a live server.
// Purpose: Exercise every REST endpoint against the in-memory gateway.
// =============================================================================

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

use std::sync::Arc;

use async_trait::async_trait;
use propsync_core::AuditError;
use propsync_core::AuditRecorder;
use propsync_core::AuditTrailEntry;
use propsync_core::EntityId;
use propsync_core::EntityKind;
use propsync_core::MemoryAuditLog;
use propsync_core::MemoryGateway;
use propsync_server::AppState;
use propsync_server::build_router;
use propsync_sync::SyncHub;
use serde_json::Value;
use serde_json::json;

/// Audit recorder whose writes always fail.
struct FailingAudit;

#[async_trait]
impl AuditRecorder for FailingAudit {
    async fn record(&self, _entry: &AuditTrailEntry) -> Result<(), AuditError> {
        Err(AuditError::Io("audit log unavailable".to_string()))
    }

    async fn history(
        &self,
        _entity_id: &EntityId,
        _kind: Option<EntityKind>,
    ) -> Result<Vec<AuditTrailEntry>, AuditError> {
        Ok(Vec::new())
    }
}

/// Spawns a server with the given audit recorder and returns its base URL.
async fn spawn_server_with_audit(audit: Arc<dyn AuditRecorder>) -> String {
    let state = AppState {
        gateway: Arc::new(MemoryGateway::new()),
        audit,
        hub: Arc::new(SyncHub::new()),
    };
    let app = build_router(state, 1_048_576);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

/// Spawns the server on an ephemeral port and returns its base URL.
async fn spawn_server() -> String {
    spawn_server_with_audit(Arc::new(MemoryAuditLog::new())).await
}

/// Creates one task and returns its server-assigned identifier.
async fn create_task(client: &reqwest::Client, base: &str, title: &str, user: &str) -> String {
    let response = client
        .post(format!("{base}/api/tasks"))
        .header("x-user-id", user)
        .json(&json!({"title": title}))
        .send()
        .await
        .expect("create request");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.expect("create body");
    assert_eq!(body["success"], true);
    body["data"]["id"].as_str().expect("id").to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let base = spawn_server().await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body");
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_i64());
}

#[tokio::test]
async fn create_then_fetch_round_trips() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "Replace filter", "alice").await;

    let body: Value = client
        .get(format!("{base}/api/tasks/{id}"))
        .send()
        .await
        .expect("get request")
        .json()
        .await
        .expect("get body");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["title"], "Replace filter");
    assert_eq!(body["data"]["status"], "todo");
    assert_eq!(body["data"]["version"], 1);
    assert_eq!(body["data"]["created_by"], "alice");
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{base}/api/widgets")).await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().expect("error").contains("unknown collection"));
}

#[tokio::test]
async fn missing_entity_is_not_found() {
    let base = spawn_server().await;
    let response = reqwest::get(format!("{base}/api/tasks/t-missing")).await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrongly_typed_field_is_rejected() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/tasks"))
        .json(&json!({"title": 42}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_ignores_caller_supplied_status() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/tasks"))
        .json(&json!({"title": "Born done", "status": "completed"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["data"]["status"], "todo");
}

#[tokio::test]
async fn create_without_status_starts_at_initial() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/maintenance"))
        .json(&json!({
            "property_id": "p-1",
            "description": "Leaky faucet in unit 4B",
            "priority": "high",
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["data"]["status"], "submitted");
}

#[tokio::test]
async fn mutation_succeeds_when_audit_writes_fail() {
    let base = spawn_server_with_audit(Arc::new(FailingAudit)).await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "Audit down", "alice").await;

    let response = client
        .put(format!("{base}/api/tasks/{id}"))
        .json(&json!({"title": "Still writable"}))
        .send()
        .await
        .expect("update request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = client
        .get(format!("{base}/api/tasks/{id}"))
        .send()
        .await
        .expect("get request")
        .json()
        .await
        .expect("get body");
    assert_eq!(body["data"]["title"], "Still writable");
    assert_eq!(body["data"]["version"], 2);
}

#[tokio::test]
async fn update_bumps_version_and_audits_changed_fields() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "Initial title", "alice").await;

    let response = client
        .put(format!("{base}/api/tasks/{id}"))
        .header("x-user-id", "bob")
        .json(&json!({"title": "Edited title"}))
        .send()
        .await
        .expect("update request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("update body");
    assert_eq!(body["data"]["version"], 2);
    assert_eq!(body["data"]["updated_by"], "bob");

    let audit: Value = client
        .get(format!("{base}/api/tasks/{id}/audit"))
        .send()
        .await
        .expect("audit request")
        .json()
        .await
        .expect("audit body");
    let rows = audit["data"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["field_changed"], "title");
    assert_eq!(rows[0]["user_id"], "bob");
    assert_eq!(rows[1]["field_changed"], "all");
}

#[tokio::test]
async fn illegal_status_transition_is_rejected() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "Transition check", "alice").await;

    let response = client
        .put(format!("{base}/api/tasks/{id}"))
        .json(&json!({"status": "completed"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("body");
    assert!(body["error"].as_str().expect("error").contains("illegal status transition"));
}

#[tokio::test]
async fn restating_current_status_passes() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "Same status", "alice").await;

    let response = client
        .put(format!("{base}/api/tasks/{id}"))
        .json(&json!({"status": "todo"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn legal_status_transition_applies() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "Start work", "alice").await;

    let response = client
        .put(format!("{base}/api/tasks/{id}"))
        .json(&json!({"status": "in_progress"}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["data"]["status"], "in_progress");
}

#[tokio::test]
async fn delete_is_soft_and_audited() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let id = create_task(&client, &base, "To delete", "alice").await;

    let response = client
        .delete(format!("{base}/api/tasks/{id}"))
        .header("x-user-id", "bob")
        .send()
        .await
        .expect("delete request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let fetch = reqwest::get(format!("{base}/api/tasks/{id}")).await.expect("get request");
    assert_eq!(fetch.status(), reqwest::StatusCode::NOT_FOUND);

    let audit: Value = client
        .get(format!("{base}/api/tasks/{id}/audit"))
        .send()
        .await
        .expect("audit request")
        .json()
        .await
        .expect("audit body");
    let rows = audit["data"].as_array().expect("rows");
    assert_eq!(rows[0]["field_changed"], "is_deleted");
    assert_eq!(rows[0]["new_value"], true);
}

#[tokio::test]
async fn list_filters_by_query_equality() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let first = create_task(&client, &base, "For alice", "system").await;
    let _second = create_task(&client, &base, "For bob", "system").await;
    let response = client
        .put(format!("{base}/api/tasks/{first}"))
        .json(&json!({"assignee": "alice"}))
        .send()
        .await
        .expect("assign request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = client
        .get(format!("{base}/api/tasks?assignee=alice"))
        .send()
        .await
        .expect("list request")
        .json()
        .await
        .expect("list body");
    let records = body["data"].as_array().expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["title"], "For alice");
}

#[tokio::test]
async fn missing_user_header_defaults_to_system() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{base}/api/tasks"))
        .json(&json!({"title": "Anonymous"}))
        .send()
        .await
        .expect("create request");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["data"]["created_by"], "system");
}
