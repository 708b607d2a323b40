// crates/propsync-core/src/interfaces/mod.rs
// ============================================================================
// Module: PropSync Interfaces
// Description: Backend-agnostic interfaces for persistence, audit, and sync.
// Purpose: Define the contract surfaces used by the PropSync runtime.
// Dependencies: async-trait, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how PropSync integrates with external systems without
//! embedding backend-specific details. The gateway is the only write path
//! to durable storage; the audit recorder is best-effort and never blocks a
//! mutation; the change notifier is the seam through which local mutations
//! reach the realtime channel.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::audit::AuditTrailEntry;
use crate::core::entity::EntityKind;
use crate::core::entity::EntityRecord;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Sync Status
// ============================================================================

/// Client-visible indicator of local/server consistency.
///
/// # Invariants
/// - Variants are stable for serialization and user-facing display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local state is believed consistent with the server.
    Synced,
    /// A mutation is in flight.
    Syncing,
    /// The most recent mutation failed.
    Failed,
    /// No connection to the server.
    Offline,
}

// ============================================================================
// SECTION: Entity Gateway
// ============================================================================

/// Equality filters applied to list queries.
///
/// # Invariants
/// - Keys are body field names; matching is exact JSON value equality.
/// - Soft-deleted rows are always excluded regardless of filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Field name → required value.
    pub equals: BTreeMap<String, Value>,
}

impl ListFilter {
    /// Creates an empty filter (no constraints).
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds an equality constraint.
    #[must_use]
    pub fn with_equal(mut self, field: impl Into<String>, value: Value) -> Self {
        self.equals.insert(field.into(), value);
        self
    }
}

/// Persistence gateway errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Underlying store I/O failure.
    #[error("gateway io error: {0}")]
    Io(String),
    /// Record not found (or soft-deleted).
    #[error("entity not found: {0}")]
    NotFound(String),
    /// Request rejected as invalid.
    #[error("gateway rejected request: {0}")]
    Invalid(String),
    /// Gateway unavailable (connection refused, timeout).
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Returns true when a retry may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }
}

/// Generic create/read/update/soft-delete over named entity collections.
///
/// Implementations assign the durable identifier on insert and bump
/// `version`/`updated_at`/`updated_by` on update; callers reconcile their
/// local state with the returned rows.
#[async_trait]
pub trait EntityGateway: Send + Sync {
    /// Fetches one record by identifier, excluding soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the lookup fails.
    async fn get(&self, kind: EntityKind, id: &EntityId)
    -> Result<Option<EntityRecord>, GatewayError>;

    /// Lists records of a kind, excluding soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the query fails.
    async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<EntityRecord>, GatewayError>;

    /// Inserts a record, assigning the durable identifier.
    ///
    /// The returned row is authoritative; the caller's synthesized id is
    /// replaced by the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the insert fails.
    async fn insert(&self, record: &EntityRecord) -> Result<EntityRecord, GatewayError>;

    /// Applies a patch to a record, bumping version and update metadata.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the record is missing or the patch is
    /// invalid.
    async fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &Map<String, Value>,
        updated_by: &UserId,
    ) -> Result<EntityRecord, GatewayError>;

    /// Soft-deletes a record; the row is retained for audit history.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the record is missing or the write
    /// fails.
    async fn soft_delete(
        &self,
        kind: EntityKind,
        id: &EntityId,
        deleted_by: &UserId,
    ) -> Result<(), GatewayError>;
}

// ============================================================================
// SECTION: Audit Recorder
// ============================================================================

/// Audit recorder errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    /// Underlying store I/O failure.
    #[error("audit io error: {0}")]
    Io(String),
}

/// Append-only audit recorder.
///
/// Recording is best-effort: callers log failures and continue; a failed
/// audit write never rolls back the triggering mutation.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Appends one audit row.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the append fails.
    async fn record(&self, entry: &AuditTrailEntry) -> Result<(), AuditError>;

    /// Returns the audit history for one entity, newest first.
    ///
    /// The result is a single finite snapshot, not a live feed.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the query fails.
    async fn history(
        &self,
        entity_id: &EntityId,
        kind: Option<EntityKind>,
    ) -> Result<Vec<AuditTrailEntry>, AuditError>;
}

// ============================================================================
// SECTION: Change Notifier
// ============================================================================

/// Change operation carried by a notification.
///
/// # Invariants
/// - Variants are stable for serialization and realtime routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Record created.
    Create,
    /// Record updated.
    Update,
    /// Record soft-deleted.
    Delete,
}

/// A confirmed mutation, as propagated to peers or received from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChange {
    /// Change operation.
    pub op: ChangeOp,
    /// Entity kind changed.
    pub entity_kind: EntityKind,
    /// Entity identifier changed.
    pub entity_id: EntityId,
    /// Full record payload for creates/updates; absent for deletes.
    pub data: Option<Value>,
    /// Record version after the change, when known.
    pub version: Option<u64>,
}

/// Outbound seam through which confirmed local mutations reach the
/// realtime layer. Notification is fire-and-forget.
pub trait ChangeNotifier: Send + Sync {
    /// Announces a confirmed mutation.
    fn notify(&self, change: &EntityChange);
}

/// No-op notifier for deployments without a realtime channel.
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify(&self, _change: &EntityChange) {}
}
