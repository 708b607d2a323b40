// crates/propsync-server/src/router.rs
// ============================================================================
// Module: PropSync REST Router
// Description: Collection and record endpoints over the entity gateway.
// Purpose: Serve CRUD, audit history, and health with the response
//          envelope.
// Dependencies: axum, propsync-core, propsync-sync, serde_json
// ============================================================================

//! ## Overview
//! Routes are keyed by collection segment (`workflows`, `leases`, `tasks`,
//! `maintenance`); an unknown segment is a `404`. Creates return `201`
//! with the stored record, updates enforce the per-kind status transition
//! rules before touching storage, and deletes are soft. Every mutation
//! writes audit rows attributed to the `x-user-id` header, defaulting to
//! the system user.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::routing::get;
use propsync_core::AuditRecorder;
use propsync_core::AuditTrailEntry;
use propsync_core::EntityBody;
use propsync_core::EntityGateway;
use propsync_core::EntityId;
use propsync_core::EntityKind;
use propsync_core::EntityMeta;
use propsync_core::EntityRecord;
use propsync_core::ListFilter;
use propsync_core::Timestamp;
use propsync_core::UserId;
use propsync_core::ValueEquality;
use propsync_core::audit_rows_for_create;
use propsync_core::audit_rows_for_delete;
use propsync_core::audit_rows_for_update;
use propsync_core::initial_status;
use propsync_core::validate_transition;
use propsync_sync::SyncHub;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::ApiError;
use crate::ws::ws_handler;

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Persistence gateway serving every collection.
    pub gateway: Arc<dyn EntityGateway>,
    /// Audit recorder receiving one row per changed field.
    pub audit: Arc<dyn AuditRecorder>,
    /// Broadcast relay joined by `/ws` connections.
    pub hub: Arc<SyncHub>,
}

/// All entity kinds, in collection order.
const KINDS: [EntityKind; 4] =
    [EntityKind::Workflow, EntityKind::Lease, EntityKind::Task, EntityKind::Maintenance];

/// Header carrying mutation attribution.
const USER_HEADER: &str = "x-user-id";

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full application router.
#[must_use]
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/{collection}", get(list_entities).post(create_entity))
        .route(
            "/api/{collection}/{id}",
            get(get_entity).put(update_entity).delete(delete_entity),
        )
        .route("/api/{collection}/{id}/audit", get(entity_audit))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================================
// SECTION: Envelope Helpers
// ============================================================================

/// Wraps a payload in the success envelope.
///
/// # Errors
///
/// Returns [`ApiError::Internal`] when the payload fails to serialize.
fn envelope<T: Serialize>(data: T) -> Result<Json<Value>, ApiError> {
    let data = serde_json::to_value(data).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(json!({
        "success": true,
        "data": data,
    })))
}

/// Resolves a collection path segment to an entity kind.
fn parse_collection(collection: &str) -> Result<EntityKind, ApiError> {
    KINDS
        .into_iter()
        .find(|kind| kind.collection() == collection)
        .ok_or_else(|| ApiError::NotFound(format!("unknown collection: {collection}")))
}

/// Extracts mutation attribution, defaulting to the system user.
fn user_from_headers(headers: &HeaderMap) -> UserId {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(UserId::system, UserId::new)
}

/// Writes audit rows best-effort; a failed write is logged to stderr and
/// never fails the already-committed mutation.
async fn record_audit(audit: &Arc<dyn AuditRecorder>, rows: &[AuditTrailEntry]) {
    for row in rows {
        if let Err(error) = audit.record(row).await {
            let _ = writeln!(std::io::stderr(), "audit write failed: {error}");
        }
    }
}

/// Fetches a live (non-deleted) record or fails with `404`.
async fn fetch_live(
    gateway: &Arc<dyn EntityGateway>,
    kind: EntityKind,
    id: &EntityId,
) -> Result<EntityRecord, ApiError> {
    match gateway.get(kind, id).await? {
        Some(record) if !record.meta.is_deleted => Ok(record),
        Some(_) | None => Err(ApiError::NotFound(format!("entity not found: {id}"))),
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /health`: liveness probe.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Timestamp::now(),
    }))
}

/// `GET /api/{collection}`: lists live records, filtered by query-string
/// equality constraints.
async fn list_entities(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_collection(&collection)?;
    let mut filter = ListFilter::none();
    for (field, value) in params {
        filter = filter.with_equal(field, Value::String(value));
    }
    let records = state.gateway.list(kind, &filter).await?;
    envelope(records)
}

/// `POST /api/{collection}`: creates a record and returns it with `201`.
///
/// The stored status is always the kind's initial status; a caller cannot
/// create a record partway through (or past) the transition graph.
async fn create_entity(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let kind = parse_collection(&collection)?;
    let Value::Object(mut fields) = payload else {
        return Err(ApiError::Validation("request body must be a JSON object".to_string()));
    };
    fields.insert("entity_type".to_string(), Value::String(kind.as_str().to_string()));
    fields.insert("status".to_string(), Value::String(initial_status(kind).to_string()));
    let body: EntityBody = serde_json::from_value(Value::Object(fields))
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    let user = user_from_headers(&headers);
    let record = EntityRecord {
        meta: EntityMeta::new(EntityId::random(), user.clone(), Timestamp::now()),
        body,
    };
    let inserted = state.gateway.insert(&record).await?;
    record_audit(&state.audit, &audit_rows_for_create(&inserted, &user)).await;
    Ok((StatusCode::CREATED, envelope(inserted)?))
}

/// `GET /api/{collection}/{id}`: fetches one live record.
async fn get_entity(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_collection(&collection)?;
    let record = fetch_live(&state.gateway, kind, &EntityId::new(id)).await?;
    envelope(record)
}

/// `PUT /api/{collection}/{id}`: applies a field patch.
///
/// A patch that moves `status` is checked against the kind's transition
/// rules before storage is touched; a patch restating the current status
/// passes through.
async fn update_entity(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_collection(&collection)?;
    let Value::Object(patch) = payload else {
        return Err(ApiError::Validation("request body must be a JSON object".to_string()));
    };
    let entity_id = EntityId::new(id);
    let snapshot = fetch_live(&state.gateway, kind, &entity_id).await?;
    if let Some(to) = patch.get("status").and_then(Value::as_str) {
        let from = snapshot.status();
        if to != from && !validate_transition(kind, from, to) {
            return Err(ApiError::Validation(format!(
                "illegal status transition for {}: {from} -> {to}",
                kind.as_str()
            )));
        }
    }
    let user = user_from_headers(&headers);
    let updated = state.gateway.update(kind, &entity_id, &patch, &user).await?;
    let rows = audit_rows_for_update(&snapshot, &patch, &user, &ValueEquality);
    record_audit(&state.audit, &rows).await;
    envelope(updated)
}

/// `DELETE /api/{collection}/{id}`: soft-deletes a record.
async fn delete_entity(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_collection(&collection)?;
    let entity_id = EntityId::new(id);
    let snapshot = fetch_live(&state.gateway, kind, &entity_id).await?;
    let user = user_from_headers(&headers);
    state.gateway.soft_delete(kind, &entity_id, &user).await?;
    record_audit(&state.audit, &audit_rows_for_delete(&snapshot, &user)).await;
    Ok(Json(json!({
        "success": true,
    })))
}

/// `GET /api/{collection}/{id}/audit`: audit history, newest first.
async fn entity_audit(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_collection(&collection)?;
    let entries = state.audit.history(&EntityId::new(id), Some(kind)).await?;
    envelope(entries)
}
