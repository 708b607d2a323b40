// crates/propsync-core/src/runtime/memory.rs
// ============================================================================
// Module: PropSync Memory Backends
// Description: In-memory gateway and audit recorder implementations.
// Purpose: Back the memory deployment mode and runtime tests.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! The memory gateway behaves like the durable backend: it assigns server
//! identifiers on insert, bumps version and update metadata on every write,
//! and hides soft-deleted rows from reads. Tests inject failures through a
//! consumable queue to exercise retry and rollback paths.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::audit::AuditTrailEntry;
use crate::core::entity::EntityKind;
use crate::core::entity::EntityRecord;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;
use crate::interfaces::AuditError;
use crate::interfaces::AuditRecorder;
use crate::interfaces::EntityGateway;
use crate::interfaces::GatewayError;
use crate::interfaces::ListFilter;

// ============================================================================
// SECTION: Memory Gateway
// ============================================================================

/// Mutable gateway state behind the lock.
struct GatewayState {
    /// Stored rows keyed by identifier; soft-deleted rows are retained.
    rows: HashMap<EntityId, EntityRecord>,
    /// Failures consumed one per gateway call, front first.
    failures: VecDeque<GatewayError>,
    /// Next server identifier suffix.
    next_id: u64,
}

/// In-memory [`EntityGateway`] with injectable failures.
///
/// # Invariants
/// - Insert assigns identifiers of the form `srv-N` in call order.
/// - Every accepted write bumps `version` by exactly 1 and refreshes
///   `updated_at`/`updated_by`.
/// - Soft-deleted rows are invisible to `get`/`list` but stay stored.
pub struct MemoryGateway {
    /// Guarded row and failure state.
    state: Mutex<GatewayState>,
    /// Count of `insert` calls received.
    insert_calls: AtomicU32,
    /// Count of `update` calls received.
    update_calls: AtomicU32,
    /// Count of `soft_delete` calls received.
    delete_calls: AtomicU32,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GatewayState {
                rows: HashMap::new(),
                failures: VecDeque::new(),
                next_id: 1,
            }),
            insert_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            delete_calls: AtomicU32::new(0),
        }
    }

    /// Locks the state, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a row as-is, keeping its identifier. Test setup helper.
    pub fn seed(&self, record: EntityRecord) {
        let mut state = self.lock();
        state.rows.insert(record.meta.id.clone(), record);
    }

    /// Queues one failure, consumed by the next gateway call.
    pub fn push_failure(&self, err: GatewayError) {
        let mut state = self.lock();
        state.failures.push_back(err);
    }

    /// Queues the same failure for the next `count` gateway calls.
    pub fn fail_times(&self, err: &GatewayError, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state.failures.push_back(err.clone());
        }
    }

    /// Returns the stored row for an identifier, soft-deleted included.
    #[must_use]
    pub fn stored(&self, id: &EntityId) -> Option<EntityRecord> {
        self.lock().rows.get(id).cloned()
    }

    /// Returns how many `insert` calls were received.
    #[must_use]
    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Returns how many `update` calls were received.
    #[must_use]
    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Returns how many `soft_delete` calls were received.
    #[must_use]
    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Pops the next queued failure, if any.
    fn take_failure(&self) -> Option<GatewayError> {
        self.lock().failures.pop_front()
    }
}

/// Returns true when a row's body matches every equality constraint.
fn matches_filter(record: &EntityRecord, filter: &ListFilter) -> bool {
    if filter.equals.is_empty() {
        return true;
    }
    let Ok(map) = record.body.to_map() else {
        return false;
    };
    filter
        .equals
        .iter()
        .all(|(field, expected)| map.get(field) == Some(expected))
}

#[async_trait]
impl EntityGateway for MemoryGateway {
    async fn get(
        &self,
        kind: EntityKind,
        id: &EntityId,
    ) -> Result<Option<EntityRecord>, GatewayError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let state = self.lock();
        Ok(state
            .rows
            .get(id)
            .filter(|record| record.kind() == kind && !record.meta.is_deleted)
            .cloned())
    }

    async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<EntityRecord>, GatewayError> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let state = self.lock();
        let mut rows: Vec<EntityRecord> = state
            .rows
            .values()
            .filter(|record| {
                record.kind() == kind && !record.meta.is_deleted && matches_filter(record, filter)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.meta
                .created_at
                .cmp(&b.meta.created_at)
                .then_with(|| a.meta.id.as_str().cmp(b.meta.id.as_str()))
        });
        Ok(rows)
    }

    async fn insert(&self, record: &EntityRecord) -> Result<EntityRecord, GatewayError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let mut state = self.lock();
        let suffix = state.next_id;
        state.next_id += 1;
        let mut stored = record.clone();
        stored.meta.id = EntityId::new(format!("srv-{suffix}"));
        stored.meta.version = 1;
        stored.meta.is_deleted = false;
        state.rows.insert(stored.meta.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &serde_json::Map<String, Value>,
        updated_by: &UserId,
    ) -> Result<EntityRecord, GatewayError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let mut state = self.lock();
        let current = state
            .rows
            .get(id)
            .filter(|record| record.kind() == kind && !record.meta.is_deleted)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        let mut next = current
            .with_patch(patch)
            .map_err(|err| GatewayError::Invalid(err.to_string()))?;
        next.meta.version = current.meta.version + 1;
        next.meta.updated_at = Timestamp::now();
        next.meta.updated_by = updated_by.clone();
        state.rows.insert(id.clone(), next.clone());
        Ok(next)
    }

    async fn soft_delete(
        &self,
        kind: EntityKind,
        id: &EntityId,
        deleted_by: &UserId,
    ) -> Result<(), GatewayError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        let mut state = self.lock();
        let record = state
            .rows
            .get_mut(id)
            .filter(|record| record.kind() == kind && !record.meta.is_deleted)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        record.meta.is_deleted = true;
        record.meta.version += 1;
        record.meta.updated_at = Timestamp::now();
        record.meta.updated_by = deleted_by.clone();
        Ok(())
    }
}

// ============================================================================
// SECTION: Memory Audit Log
// ============================================================================

/// In-memory append-only [`AuditRecorder`].
#[derive(Default)]
pub struct MemoryAuditLog {
    /// Appended rows, oldest first.
    entries: Mutex<Vec<AuditTrailEntry>>,
}

impl MemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every appended row, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditTrailEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AuditRecorder for MemoryAuditLog {
    async fn record(&self, entry: &AuditTrailEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push(entry.clone());
        Ok(())
    }

    async fn history(
        &self,
        entity_id: &EntityId,
        kind: Option<EntityKind>,
    ) -> Result<Vec<AuditTrailEntry>, AuditError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| {
                entry.entity_id == *entity_id
                    && kind.is_none_or(|wanted| entry.entity_kind == wanted)
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
