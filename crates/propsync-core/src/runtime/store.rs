// crates/propsync-core/src/runtime/store.rs
// ============================================================================
// Module: PropSync Entity Store
// Description: Optimistic per-kind entity collection with rollback and retry.
// Purpose: Apply mutations locally first, reconcile with the gateway after.
// Dependencies: serde_json, thiserror, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The store holds one kind's records and applies every mutation
//! optimistically: local state changes before the gateway call, then is
//! reconciled with the confirmed row on success or rolled back
//! byte-for-byte on failure. Failed mutations are queued as pending
//! operations for replay. Confirmed mutations emit audit rows (best-effort)
//! and a change notification; externally received changes do neither.
//!
//! The lock is released across every gateway call. Two overlapping
//! mutations of the same record therefore race, and the later confirmation
//! wins; conflicts are surfaced for display, never enforced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::audit::AuditTrailEntry;
use crate::core::audit::FieldEquality;
use crate::core::audit::ValueEquality;
use crate::core::audit::audit_rows_for_create;
use crate::core::audit::audit_rows_for_delete;
use crate::core::audit::audit_rows_for_update;
use crate::core::conflict::ConflictKind;
use crate::core::conflict::EntityConflict;
use crate::core::conflict::check_version_conflict;
use crate::core::entity::EntityBody;
use crate::core::entity::EntityError;
use crate::core::entity::EntityKind;
use crate::core::entity::EntityMeta;
use crate::core::entity::EntityRecord;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::UserId;
use crate::core::pending::OperationKind;
use crate::core::pending::PendingOperation;
use crate::core::status::initial_status;
use crate::core::status::validate_transition;
use crate::core::time::Timestamp;
use crate::interfaces::AuditRecorder;
use crate::interfaces::ChangeNotifier;
use crate::interfaces::ChangeOp;
use crate::interfaces::EntityChange;
use crate::interfaces::EntityGateway;
use crate::interfaces::GatewayError;
use crate::interfaces::ListFilter;
use crate::interfaces::NoopNotifier;
use crate::interfaces::SyncStatus;
use crate::runtime::mutation::MutationSnapshot;
use crate::runtime::mutation::rollback;
use crate::runtime::retry::RetryPolicy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Entity store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with the identifier exists locally.
    #[error("entity not found: {0}")]
    NotFound(EntityId),
    /// The body's kind does not match the store's kind.
    #[error("store holds {store:?} records, got {got:?}")]
    KindMismatch {
        /// Kind the store manages.
        store: EntityKind,
        /// Kind that was offered.
        got: EntityKind,
    },
    /// The requested status change is not a declared transition edge.
    #[error("illegal {kind:?} status transition: {from} -> {to}")]
    IllegalTransition {
        /// Entity kind involved.
        kind: EntityKind,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },
    /// The patch or payload failed entity validation.
    #[error(transparent)]
    Validation(#[from] EntityError),
    /// The gateway call failed after retries.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

// ============================================================================
// SECTION: Bulk Outcome
// ============================================================================

/// Result of a bulk status change.
///
/// Illegal and missing targets are skipped without failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkStatusOutcome {
    /// Identifiers whose status change was confirmed.
    pub applied: Vec<EntityId>,
    /// Identifiers skipped: missing locally or illegal transition.
    pub skipped: Vec<EntityId>,
    /// Identifiers whose gateway call failed (queued as pending).
    pub failed: Vec<EntityId>,
}

// ============================================================================
// SECTION: Store State
// ============================================================================

/// Mutable store state behind the lock.
struct StoreState {
    /// Local records, soft-deleted rows excluded.
    records: Vec<EntityRecord>,
    /// Client-visible consistency indicator.
    sync_status: SyncStatus,
    /// Failed mutations awaiting replay.
    pending: Vec<PendingOperation>,
    /// Surfaced concurrent-edit conflicts.
    conflicts: Vec<EntityConflict>,
}

// ============================================================================
// SECTION: Entity Store
// ============================================================================

/// Optimistic collection of one entity kind's records.
///
/// # Invariants
/// - The lock is never held across a gateway call.
/// - Every failure path restores local state via [`rollback`], so a failed
///   mutation leaves records exactly as they were before it.
/// - Audit writes and change notifications happen only for confirmed local
///   mutations, never for externally received changes.
pub struct EntityStore {
    /// Entity kind this store manages.
    kind: EntityKind,
    /// User attributed on mutations issued by this store.
    user: UserId,
    /// Persistence gateway.
    gateway: Arc<dyn EntityGateway>,
    /// Best-effort audit recorder.
    audit: Arc<dyn AuditRecorder>,
    /// Outbound realtime seam.
    notifier: Arc<dyn ChangeNotifier>,
    /// Field equality strategy for audit diffing.
    equality: Arc<dyn FieldEquality>,
    /// Retry policy for gateway calls.
    retry: RetryPolicy,
    /// Guarded mutable state.
    state: Mutex<StoreState>,
}

impl EntityStore {
    /// Creates a store with the default notifier, equality, and retry
    /// policy.
    #[must_use]
    pub fn new(
        kind: EntityKind,
        user: UserId,
        gateway: Arc<dyn EntityGateway>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            kind,
            user,
            gateway,
            audit,
            notifier: Arc::new(NoopNotifier),
            equality: Arc::new(ValueEquality),
            retry: RetryPolicy::default(),
            state: Mutex::new(StoreState {
                records: Vec::new(),
                sync_status: SyncStatus::Synced,
                pending: Vec::new(),
                conflicts: Vec::new(),
            }),
        }
    }

    /// Replaces the change notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the field equality strategy used for audit diffing.
    #[must_use]
    pub fn with_equality(mut self, equality: Arc<dyn FieldEquality>) -> Self {
        self.equality = equality;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the kind this store manages.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns a snapshot of the local records.
    #[must_use]
    pub fn records(&self) -> Vec<EntityRecord> {
        self.lock_state().records.clone()
    }

    /// Returns one local record by identifier.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<EntityRecord> {
        self.lock_state().records.iter().find(|record| record.meta.id == *id).cloned()
    }

    /// Returns the current sync status.
    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.lock_state().sync_status
    }

    /// Returns a snapshot of the pending operation queue.
    #[must_use]
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.lock_state().pending.clone()
    }

    /// Returns a snapshot of the surfaced conflicts.
    #[must_use]
    pub fn conflicts(&self) -> Vec<EntityConflict> {
        self.lock_state().conflicts.clone()
    }

    /// Removes and returns the surfaced conflicts.
    #[must_use]
    pub fn take_conflicts(&self) -> Vec<EntityConflict> {
        std::mem::take(&mut self.lock_state().conflicts)
    }

    /// Marks the store offline or back online.
    ///
    /// Offline is a transport-level signal set by the realtime layer; it
    /// does not block mutations, which fail through the gateway as usual.
    pub fn set_offline(&self, offline: bool) {
        let mut state = self.lock_state();
        if offline {
            state.sync_status = SyncStatus::Offline;
        } else if state.sync_status == SyncStatus::Offline {
            state.sync_status =
                if state.pending.is_empty() { SyncStatus::Synced } else { SyncStatus::Failed };
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Loads records from the gateway, replacing local state wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Gateway`] when the list call fails; local
    /// records are left untouched in that case.
    pub async fn load(&self, filter: &ListFilter) -> Result<usize, StoreError> {
        {
            let mut state = self.lock_state();
            state.sync_status = SyncStatus::Syncing;
        }
        match self.retry.run(|| self.gateway.list(self.kind, filter)).await {
            Ok(rows) => {
                let count = rows.len();
                let mut state = self.lock_state();
                state.records = rows;
                state.sync_status = SyncStatus::Synced;
                Ok(count)
            }
            Err(err) => {
                let mut state = self.lock_state();
                state.sync_status = SyncStatus::Failed;
                Err(err.into())
            }
        }
    }

    /// Creates a record optimistically.
    ///
    /// The new record appears locally at once under a synthesized
    /// identifier and the declared initial status for the kind; the
    /// caller-provided status is ignored. On confirmation the synthesized
    /// identifier is replaced by the server-assigned one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KindMismatch`] for a body of the wrong kind
    /// and [`StoreError::Gateway`] when the insert fails after retries; the
    /// optimistic record is removed and the create is queued as pending.
    pub async fn add(&self, body: EntityBody) -> Result<EntityRecord, StoreError> {
        if body.kind() != self.kind {
            return Err(StoreError::KindMismatch {
                store: self.kind,
                got: body.kind(),
            });
        }
        let body = body_with_initial_status(body)?;
        let local = EntityRecord {
            meta: EntityMeta::new(EntityId::random(), self.user.clone(), Timestamp::now()),
            body,
        };
        {
            let mut state = self.lock_state();
            state.records.push(local.clone());
            state.sync_status = SyncStatus::Syncing;
        }
        match self.retry.run(|| self.gateway.insert(&local)).await {
            Ok(confirmed) => {
                {
                    let mut state = self.lock_state();
                    if let Some(slot) =
                        state.records.iter_mut().find(|record| record.meta.id == local.meta.id)
                    {
                        *slot = confirmed.clone();
                    }
                    state.sync_status = SyncStatus::Synced;
                }
                self.record_audit(audit_rows_for_create(&confirmed, &self.user)).await;
                self.notify_record(ChangeOp::Create, &confirmed);
                Ok(confirmed)
            }
            Err(err) => {
                let payload = serde_json::to_value(&local).unwrap_or(Value::Null);
                let mut state = self.lock_state();
                rollback(&mut state.records, MutationSnapshot::Created {
                    id: local.meta.id.clone(),
                });
                state.pending.push(PendingOperation::new(
                    self.kind,
                    None,
                    OperationKind::Create,
                    payload,
                    err.to_string(),
                ));
                state.sync_status = SyncStatus::Failed;
                Err(err.into())
            }
        }
    }

    /// Applies a shallow patch optimistically.
    ///
    /// The merge is visible locally at once with a refreshed `updated_at`;
    /// the version advances only when the confirmed row comes back. A patch
    /// that changes `status` must follow the declared transition graph.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`], [`StoreError::Validation`], or
    /// [`StoreError::IllegalTransition`] without touching local state, and
    /// [`StoreError::Gateway`] when the call fails after retries; the
    /// record is rolled back byte-for-byte and the patch queued as pending.
    pub async fn update(
        &self,
        id: &EntityId,
        patch: &Map<String, Value>,
    ) -> Result<EntityRecord, StoreError> {
        let snapshot = self.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if let Some(Value::String(to)) = patch.get("status") {
            let from = snapshot.status();
            if to != from && !validate_transition(self.kind, from, to) {
                return Err(StoreError::IllegalTransition {
                    kind: self.kind,
                    from: from.to_string(),
                    to: to.clone(),
                });
            }
        }
        let mut optimistic = snapshot.with_patch(patch)?;
        optimistic.meta.updated_at = Timestamp::now();
        optimistic.meta.updated_by = self.user.clone();
        {
            let mut state = self.lock_state();
            if let Some(slot) = state.records.iter_mut().find(|record| record.meta.id == *id) {
                *slot = optimistic;
            }
            state.sync_status = SyncStatus::Syncing;
        }
        match self.retry.run(|| self.gateway.update(self.kind, id, patch, &self.user)).await {
            Ok(confirmed) => {
                {
                    let mut state = self.lock_state();
                    if let Some(slot) =
                        state.records.iter_mut().find(|record| record.meta.id == *id)
                    {
                        *slot = confirmed.clone();
                    }
                    state.sync_status = SyncStatus::Synced;
                }
                self.record_audit(audit_rows_for_update(
                    &snapshot,
                    patch,
                    &self.user,
                    self.equality.as_ref(),
                ))
                .await;
                self.notify_record(ChangeOp::Update, &confirmed);
                Ok(confirmed)
            }
            Err(err) => {
                let mut state = self.lock_state();
                rollback(&mut state.records, MutationSnapshot::Updated {
                    record: snapshot,
                });
                state.pending.push(PendingOperation::new(
                    self.kind,
                    Some(id.clone()),
                    OperationKind::Update,
                    Value::Object(patch.clone()),
                    err.to_string(),
                ));
                state.sync_status = SyncStatus::Failed;
                Err(err.into())
            }
        }
    }

    /// Soft-deletes a record optimistically.
    ///
    /// The record vanishes from local state at once; the durable row is
    /// retained for the audit trail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] without touching local state, and
    /// [`StoreError::Gateway`] when the call fails after retries; the
    /// record is re-inserted at its original position and the delete
    /// queued as pending.
    pub async fn remove(&self, id: &EntityId) -> Result<(), StoreError> {
        let (snapshot, index) = {
            let mut state = self.lock_state();
            let index = state
                .records
                .iter()
                .position(|record| record.meta.id == *id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let snapshot = state.records.remove(index);
            state.sync_status = SyncStatus::Syncing;
            (snapshot, index)
        };
        match self.retry.run(|| self.gateway.soft_delete(self.kind, id, &self.user)).await {
            Ok(()) => {
                {
                    let mut state = self.lock_state();
                    state.sync_status = SyncStatus::Synced;
                }
                self.record_audit(audit_rows_for_delete(&snapshot, &self.user)).await;
                self.notify_delete(id);
                Ok(())
            }
            Err(err) => {
                let mut state = self.lock_state();
                rollback(&mut state.records, MutationSnapshot::Removed {
                    record: snapshot,
                    index,
                });
                state.pending.push(PendingOperation::new(
                    self.kind,
                    Some(id.clone()),
                    OperationKind::Delete,
                    Value::Null,
                    err.to_string(),
                ));
                state.sync_status = SyncStatus::Failed;
                Err(err.into())
            }
        }
    }

    /// Changes a record's status along a declared transition edge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or
    /// [`StoreError::IllegalTransition`] before any gateway call, and the
    /// underlying [`update`](Self::update) errors otherwise.
    pub async fn change_status(
        &self,
        id: &EntityId,
        to: &str,
    ) -> Result<EntityRecord, StoreError> {
        let from = {
            let state = self.lock_state();
            state
                .records
                .iter()
                .find(|record| record.meta.id == *id)
                .map(EntityRecord::status)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?
        };
        if !validate_transition(self.kind, from, to) {
            return Err(StoreError::IllegalTransition {
                kind: self.kind,
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let mut patch = Map::new();
        patch.insert("status".to_string(), Value::String(to.to_string()));
        self.update(id, &patch).await
    }

    /// Changes the status of many records, skipping illegal targets.
    ///
    /// Missing records and records whose current status has no edge to the
    /// target are skipped silently; no gateway call is issued for them.
    pub async fn bulk_change_status(&self, ids: &[EntityId], to: &str) -> BulkStatusOutcome {
        let mut outcome = BulkStatusOutcome::default();
        for id in ids {
            match self.change_status(id, to).await {
                Ok(_) => outcome.applied.push(id.clone()),
                Err(StoreError::NotFound(_) | StoreError::IllegalTransition { .. }) => {
                    outcome.skipped.push(id.clone());
                }
                Err(_) => outcome.failed.push(id.clone()),
            }
        }
        outcome
    }

    /// Replays the pending operation queue, returning the confirmed count.
    ///
    /// Successful replays are removed from the queue and emit the same
    /// audit rows and notifications as a direct mutation. Failed replays
    /// stay queued with an incremented retry count.
    pub async fn retry_pending(&self) -> usize {
        let queued: Vec<PendingOperation> = {
            let mut state = self.lock_state();
            std::mem::take(&mut state.pending)
        };
        let mut survivors = Vec::new();
        let mut confirmed = 0usize;
        for mut op in queued {
            match self.replay(&op).await {
                Ok(()) => confirmed += 1,
                Err(err) => {
                    op.mark_failed(err.to_string());
                    survivors.push(op);
                }
            }
        }
        let mut state = self.lock_state();
        survivors.append(&mut state.pending);
        state.pending = survivors;
        state.sync_status =
            if state.pending.is_empty() { SyncStatus::Synced } else { SyncStatus::Failed };
        confirmed
    }

    /// Replays one pending operation against the gateway.
    async fn replay(&self, op: &PendingOperation) -> Result<(), StoreError> {
        match op.operation {
            OperationKind::Create => {
                let record: EntityRecord = serde_json::from_value(op.payload.clone())
                    .map_err(|err| EntityError::InvalidValue(err.to_string()))?;
                let confirmed = self.retry.run(|| self.gateway.insert(&record)).await?;
                {
                    let mut state = self.lock_state();
                    state.records.push(confirmed.clone());
                }
                self.record_audit(audit_rows_for_create(&confirmed, &self.user)).await;
                self.notify_record(ChangeOp::Create, &confirmed);
                Ok(())
            }
            OperationKind::Update => {
                let id = op
                    .entity_id
                    .clone()
                    .ok_or_else(|| EntityError::InvalidValue("pending update without id".into()))?;
                let Value::Object(patch) = &op.payload else {
                    return Err(
                        EntityError::InvalidValue("pending update without patch".into()).into()
                    );
                };
                let snapshot = self.get(&id);
                let confirmed =
                    self.retry.run(|| self.gateway.update(self.kind, &id, patch, &self.user)).await?;
                {
                    let mut state = self.lock_state();
                    if let Some(slot) =
                        state.records.iter_mut().find(|record| record.meta.id == id)
                    {
                        *slot = confirmed.clone();
                    } else {
                        state.records.push(confirmed.clone());
                    }
                }
                if let Some(snapshot) = snapshot {
                    self.record_audit(audit_rows_for_update(
                        &snapshot,
                        patch,
                        &self.user,
                        self.equality.as_ref(),
                    ))
                    .await;
                }
                self.notify_record(ChangeOp::Update, &confirmed);
                Ok(())
            }
            OperationKind::Delete => {
                let id = op
                    .entity_id
                    .clone()
                    .ok_or_else(|| EntityError::InvalidValue("pending delete without id".into()))?;
                let snapshot = self.get(&id);
                self.retry.run(|| self.gateway.soft_delete(self.kind, &id, &self.user)).await?;
                {
                    let mut state = self.lock_state();
                    state.records.retain(|record| record.meta.id != id);
                }
                if let Some(snapshot) = snapshot {
                    self.record_audit(audit_rows_for_delete(&snapshot, &self.user)).await;
                }
                self.notify_delete(&id);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // External changes
    // ------------------------------------------------------------------

    /// Applies a change received from the realtime channel.
    ///
    /// The remote row replaces the local one even when its version does not
    /// advance the local version; in that case a conflict is surfaced for
    /// display first. Changes for another kind are ignored. No audit rows
    /// and no notifications are produced, so relayed changes never echo.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] when the payload does not parse
    /// as a record of this kind.
    pub fn apply_external(&self, change: &EntityChange) -> Result<(), StoreError> {
        if change.entity_kind != self.kind {
            return Ok(());
        }
        match change.op {
            ChangeOp::Create | ChangeOp::Update => {
                let Some(data) = &change.data else {
                    return Ok(());
                };
                let incoming: EntityRecord = serde_json::from_value(data.clone())
                    .map_err(|err| EntityError::InvalidValue(err.to_string()))?;
                let mut state = self.lock_state();
                let position =
                    state.records.iter().position(|record| record.meta.id == change.entity_id);
                if let Some(index) = position {
                    let local_version = state.records[index].meta.version;
                    if check_version_conflict(local_version, incoming.meta.version) {
                        let local_data =
                            serde_json::to_value(&state.records[index]).unwrap_or(Value::Null);
                        state.conflicts.push(EntityConflict {
                            entity_kind: self.kind,
                            entity_id: change.entity_id.clone(),
                            local_version,
                            remote_version: incoming.meta.version,
                            local_data,
                            remote_data: data.clone(),
                            conflict_type: ConflictKind::VersionMismatch,
                        });
                    }
                    if incoming.meta.is_deleted {
                        state.records.remove(index);
                    } else {
                        state.records[index] = incoming;
                    }
                } else if !incoming.meta.is_deleted {
                    state.records.push(incoming);
                }
                Ok(())
            }
            ChangeOp::Delete => {
                let mut state = self.lock_state();
                state.records.retain(|record| record.meta.id != change.entity_id);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Locks the state, recovering from poisoning.
    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records audit rows, logging failures without failing the mutation.
    async fn record_audit(&self, rows: Vec<AuditTrailEntry>) {
        for row in rows {
            if let Err(err) = self.audit.record(&row).await {
                let _ = writeln!(std::io::stderr(), "propsync: audit write failed: {err}");
            }
        }
    }

    /// Announces a confirmed create or update.
    fn notify_record(&self, op: ChangeOp, record: &EntityRecord) {
        let change = EntityChange {
            op,
            entity_kind: self.kind,
            entity_id: record.meta.id.clone(),
            data: serde_json::to_value(record).ok(),
            version: Some(record.meta.version),
        };
        self.notifier.notify(&change);
    }

    /// Announces a confirmed soft delete.
    fn notify_delete(&self, id: &EntityId) {
        let change = EntityChange {
            op: ChangeOp::Delete,
            entity_kind: self.kind,
            entity_id: id.clone(),
            data: None,
            version: None,
        };
        self.notifier.notify(&change);
    }
}

/// Forces a freshly created body onto the kind's declared initial status.
fn body_with_initial_status(body: EntityBody) -> Result<EntityBody, EntityError> {
    let kind = body.kind();
    let mut map = body.to_map()?;
    map.insert("status".to_string(), Value::String(initial_status(kind).to_string()));
    serde_json::from_value(Value::Object(map)).map_err(|err| EntityError::InvalidValue(err.to_string()))
}
