// crates/propsync-core/src/core/audit.rs
// ============================================================================
// Module: PropSync Audit Trail
// Description: Field-level audit rows and the diffing that produces them.
// Purpose: Record what changed, by whom, when — for history, not enforcement.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The audit trail is an append-only log of field-level changes. Creates
//! produce one synthetic `all` row, updates produce one row per changed
//! top-level field, and soft-deletes produce one `is_deleted` row. Audit
//! rows are never consulted for conflict resolution.
//!
//! Field change detection goes through the [`FieldEquality`] strategy so an
//! alternative notion of equality can be swapped in without touching the
//! call sites.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::entity::EntityKind;
use crate::core::entity::EntityRecord;
use crate::core::identifiers::EntityId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Field label for the synthetic create row.
const FIELD_ALL: &str = "all";

/// Field label for the soft-delete row.
const FIELD_IS_DELETED: &str = "is_deleted";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Mutation operation recorded in an audit row.
///
/// # Invariants
/// - Variants are stable for serialization and history display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    /// Record creation.
    Create,
    /// Field update.
    Update,
    /// Soft deletion.
    Delete,
}

/// Immutable audit row describing one field change.
///
/// # Invariants
/// - Rows are append-only; nothing mutates or deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    /// Entity kind the change applies to.
    pub entity_kind: EntityKind,
    /// Entity identifier the change applies to.
    pub entity_id: EntityId,
    /// Changed field name (`all` for creates, `is_deleted` for deletes).
    pub field_changed: String,
    /// Prior value, when one existed.
    pub old_value: Option<Value>,
    /// New value, when one exists.
    pub new_value: Option<Value>,
    /// Operation that produced the row.
    pub operation: AuditOperation,
    /// Acting user.
    pub user_id: UserId,
    /// Row timestamp.
    pub recorded_at: Timestamp,
}

// ============================================================================
// SECTION: Field Equality
// ============================================================================

/// Equality strategy used to decide whether a field changed.
pub trait FieldEquality: Send + Sync {
    /// Returns true when the two values are considered equal.
    fn equal(&self, old: &Value, new: &Value) -> bool;
}

/// Default strategy: JSON value equality.
///
/// # Invariants
/// - Comparison is structural; object key order does not matter.
pub struct ValueEquality;

impl FieldEquality for ValueEquality {
    fn equal(&self, old: &Value, new: &Value) -> bool {
        old == new
    }
}

// ============================================================================
// SECTION: Row Builders
// ============================================================================

/// Builds the single synthetic row recorded for a create.
#[must_use]
pub fn audit_rows_for_create(record: &EntityRecord, user: &UserId) -> Vec<AuditTrailEntry> {
    let new_value = serde_json::to_value(record).ok();
    vec![AuditTrailEntry {
        entity_kind: record.kind(),
        entity_id: record.id().clone(),
        field_changed: FIELD_ALL.to_string(),
        old_value: None,
        new_value,
        operation: AuditOperation::Create,
        user_id: user.clone(),
        recorded_at: Timestamp::now(),
    }]
}

/// Builds one row per top-level field whose value differs between the
/// pre-update snapshot and the incoming patch.
#[must_use]
pub fn audit_rows_for_update(
    snapshot: &EntityRecord,
    patch: &Map<String, Value>,
    user: &UserId,
    equality: &dyn FieldEquality,
) -> Vec<AuditTrailEntry> {
    let old_map = snapshot.body.to_map().unwrap_or_default();
    let mut rows = Vec::new();
    for (field, new_value) in patch {
        let old_value = old_map.get(field);
        let changed = old_value.is_none_or(|old| !equality.equal(old, new_value));
        if changed {
            rows.push(AuditTrailEntry {
                entity_kind: snapshot.kind(),
                entity_id: snapshot.id().clone(),
                field_changed: field.clone(),
                old_value: old_value.cloned(),
                new_value: Some(new_value.clone()),
                operation: AuditOperation::Update,
                user_id: user.clone(),
                recorded_at: Timestamp::now(),
            });
        }
    }
    rows
}

/// Builds the single row recorded for a soft delete.
#[must_use]
pub fn audit_rows_for_delete(record: &EntityRecord, user: &UserId) -> Vec<AuditTrailEntry> {
    vec![AuditTrailEntry {
        entity_kind: record.kind(),
        entity_id: record.id().clone(),
        field_changed: FIELD_IS_DELETED.to_string(),
        old_value: Some(Value::Bool(false)),
        new_value: Some(Value::Bool(true)),
        operation: AuditOperation::Delete,
        user_id: user.clone(),
        recorded_at: Timestamp::now(),
    }]
}

// ============================================================================
// SECTION: Tests
// ============================================================================
