// crates/propsync-core/src/core/entity.rs
// ============================================================================
// Module: PropSync Entity Model
// Description: Versioned, soft-deletable domain records and patches.
// Purpose: Define the four entity variants and their shared metadata shape.
// Dependencies: bigdecimal, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every domain record shares the same metadata shape: an immutable
//! identifier, creation/update timestamps and attributions, a version that
//! advances by exactly 1 per accepted update, and a soft-delete flag. The
//! four variants add their domain fields. Patches are shallow JSON maps
//! applied to the body; applying a patch round-trips through serde so
//! wrong-typed values are rejected before any network call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::EntityId;
use crate::core::identifiers::UserId;
use crate::core::status::LeaseStatus;
use crate::core::status::MaintenanceStatus;
use crate::core::status::TaskStatus;
use crate::core::status::WorkflowStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Entity Kind
// ============================================================================

/// Entity kinds managed by PropSync.
///
/// # Invariants
/// - Variants are stable for serialization, routing, and table naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Property workflow.
    Workflow,
    /// Lease agreement.
    Lease,
    /// Workflow task.
    Task,
    /// Maintenance request.
    Maintenance,
}

impl EntityKind {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Lease => "lease",
            Self::Task => "task",
            Self::Maintenance => "maintenance",
        }
    }

    /// Parses a wire label into a kind.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "workflow" => Some(Self::Workflow),
            "lease" => Some(Self::Lease),
            "task" => Some(Self::Task),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Returns the REST collection segment for the kind.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Workflow => "workflows",
            Self::Lease => "leases",
            Self::Task => "tasks",
            Self::Maintenance => "maintenance",
        }
    }

    /// Returns the patchable body field names for the kind.
    ///
    /// Patch keys outside this list are rejected before any network call.
    #[must_use]
    pub const fn field_names(self) -> &'static [&'static str] {
        match self {
            Self::Workflow => {
                &["title", "assignee", "due_date", "priority", "property_id", "status"]
            }
            Self::Lease => &[
                "property_id",
                "tenant_name",
                "start_date",
                "end_date",
                "rent_amount",
                "security_deposit",
                "status",
            ],
            Self::Task => &[
                "title",
                "assignee",
                "parent_workflow_id",
                "blocker_reason",
                "estimated_hours",
                "actual_hours",
                "status",
            ],
            Self::Maintenance => &[
                "property_id",
                "description",
                "priority",
                "cost_estimate",
                "actual_cost",
                "status",
            ],
        }
    }
}

// ============================================================================
// SECTION: Shared Field Types
// ============================================================================

/// Priority scale shared by workflows and maintenance requests.
///
/// # Invariants
/// - Variants are stable for serialization and display ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
    /// Urgent priority.
    Urgent,
}

// ============================================================================
// SECTION: Entity Metadata
// ============================================================================

/// Metadata shared by every entity variant.
///
/// # Invariants
/// - `id` is assigned at creation and immutable.
/// - `version` starts at 1 and advances by exactly 1 per accepted update.
/// - `is_deleted` records soft deletion; rows are never physically removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    /// Opaque unique identifier.
    pub id: EntityId,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last-mutation timestamp; advances on every mutation.
    pub updated_at: Timestamp,
    /// User that created the record.
    pub created_by: UserId,
    /// User that last mutated the record.
    pub updated_by: UserId,
    /// Monotonic record version; display/detection signal only.
    pub version: u64,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

impl EntityMeta {
    /// Creates metadata for a freshly created record at version 1.
    #[must_use]
    pub fn new(id: EntityId, created_by: UserId, created_at: Timestamp) -> Self {
        Self {
            id,
            created_at,
            updated_at: created_at,
            created_by: created_by.clone(),
            updated_by: created_by,
            version: 1,
            is_deleted: false,
        }
    }
}

// ============================================================================
// SECTION: Entity Bodies
// ============================================================================

/// Workflow domain fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowBody {
    /// Workflow title.
    pub title: String,
    /// Assigned user, if any.
    pub assignee: Option<String>,
    /// Due date, if any.
    pub due_date: Option<String>,
    /// Workflow priority.
    pub priority: Priority,
    /// Related property identifier, if any.
    pub property_id: Option<EntityId>,
    /// Workflow status.
    pub status: WorkflowStatus,
}

/// Lease domain fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseBody {
    /// Related property identifier.
    pub property_id: EntityId,
    /// Tenant display name.
    pub tenant_name: String,
    /// Lease start date.
    pub start_date: String,
    /// Lease end date.
    pub end_date: String,
    /// Monthly rent amount.
    pub rent_amount: BigDecimal,
    /// Security deposit amount.
    pub security_deposit: BigDecimal,
    /// Lease status.
    pub status: LeaseStatus,
}

/// Task domain fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBody {
    /// Task title.
    pub title: String,
    /// Assigned user, if any.
    pub assignee: Option<String>,
    /// Parent workflow identifier, if any.
    pub parent_workflow_id: Option<EntityId>,
    /// Reason the task is blocked, if any.
    pub blocker_reason: Option<String>,
    /// Estimated effort in hours, if any.
    pub estimated_hours: Option<u32>,
    /// Actual effort in hours, if any.
    pub actual_hours: Option<u32>,
    /// Task status.
    pub status: TaskStatus,
}

/// Maintenance request domain fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceBody {
    /// Related property identifier.
    pub property_id: EntityId,
    /// Problem description.
    pub description: String,
    /// Request priority.
    pub priority: Priority,
    /// Estimated cost, if any.
    pub cost_estimate: Option<BigDecimal>,
    /// Actual cost, if any.
    pub actual_cost: Option<BigDecimal>,
    /// Request status.
    pub status: MaintenanceStatus,
}

/// Entity body variants, internally tagged by `entity_type`.
///
/// # Invariants
/// - The tag is stable for serialization and realtime routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityBody {
    /// Workflow body.
    Workflow(WorkflowBody),
    /// Lease body.
    Lease(LeaseBody),
    /// Task body.
    Task(TaskBody),
    /// Maintenance request body.
    Maintenance(MaintenanceBody),
}

impl EntityBody {
    /// Returns the entity kind of this body.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Workflow(_) => EntityKind::Workflow,
            Self::Lease(_) => EntityKind::Lease,
            Self::Task(_) => EntityKind::Task,
            Self::Maintenance(_) => EntityKind::Maintenance,
        }
    }

    /// Returns the current status label.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Workflow(body) => body.status.as_str(),
            Self::Lease(body) => body.status.as_str(),
            Self::Task(body) => body.status.as_str(),
            Self::Maintenance(body) => body.status.as_str(),
        }
    }

    /// Serializes the body into a flat JSON map (tag included).
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] when serialization fails.
    pub fn to_map(&self) -> Result<Map<String, Value>, EntityError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(EntityError::Serialization),
        }
    }
}

// ============================================================================
// SECTION: Entity Record
// ============================================================================

/// A full domain record: shared metadata plus one body variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Shared metadata.
    #[serde(flatten)]
    pub meta: EntityMeta,
    /// Domain fields.
    #[serde(flatten)]
    pub body: EntityBody,
}

impl EntityRecord {
    /// Returns the entity kind of this record.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> &EntityId {
        &self.meta.id
    }

    /// Returns the current status label.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        self.body.status()
    }

    /// Applies a shallow patch to the body, returning the patched record.
    ///
    /// Patch keys are validated against the kind's declared field names and
    /// values are revalidated through serde, so an unknown field or a
    /// wrong-typed value is rejected without mutating `self`.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] when a key is unknown or a value is invalid.
    pub fn with_patch(&self, patch: &Map<String, Value>) -> Result<Self, EntityError> {
        let kind = self.kind();
        for key in patch.keys() {
            if !kind.field_names().contains(&key.as_str()) {
                return Err(EntityError::UnknownField {
                    kind,
                    field: key.clone(),
                });
            }
        }
        let mut map = self.body.to_map()?;
        for (key, value) in patch {
            map.insert(key.clone(), value.clone());
        }
        let body: EntityBody = serde_json::from_value(Value::Object(map))
            .map_err(|err| EntityError::InvalidValue(err.to_string()))?;
        Ok(Self {
            meta: self.meta.clone(),
            body,
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Entity model errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EntityError {
    /// Patch referenced a field the kind does not declare.
    #[error("unknown field `{field}` for {kind:?}")]
    UnknownField {
        /// Entity kind the patch targeted.
        kind: EntityKind,
        /// Offending field name.
        field: String,
    },
    /// Patch value failed body revalidation.
    #[error("invalid field value: {0}")]
    InvalidValue(String),
    /// Body serialization failed.
    #[error("entity serialization failed")]
    Serialization,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::*;

    fn sample_task() -> EntityRecord {
        EntityRecord {
            meta: EntityMeta::new(
                EntityId::new("task-1"),
                UserId::system(),
                Timestamp::from_unix_millis(1_000),
            ),
            body: EntityBody::Task(TaskBody {
                title: "Replace filters".to_string(),
                assignee: None,
                parent_workflow_id: None,
                blocker_reason: None,
                estimated_hours: Some(2),
                actual_hours: None,
                status: TaskStatus::Todo,
            }),
        }
    }

    #[test]
    fn new_meta_starts_at_version_one() {
        let record = sample_task();
        assert_eq!(record.meta.version, 1);
        assert_eq!(record.meta.created_at, record.meta.updated_at);
        assert!(!record.meta.is_deleted);
    }

    #[test]
    fn record_serializes_flat_with_entity_type_tag() {
        let record = sample_task();
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["entity_type"], "task");
        assert_eq!(value["id"], "task-1");
        assert_eq!(value["status"], "todo");
        assert_eq!(value["version"], 1);
    }

    #[test]
    fn patch_merges_declared_fields() {
        let record = sample_task();
        let mut patch = Map::new();
        patch.insert("title".to_string(), json!("Replace all filters"));
        patch.insert("status".to_string(), json!("in_progress"));
        let patched = record.with_patch(&patch).expect("patch");
        assert_eq!(patched.status(), "in_progress");
        match patched.body {
            EntityBody::Task(body) => assert_eq!(body.title, "Replace all filters"),
            _ => panic!("kind changed"),
        }
    }

    #[test]
    fn patch_rejects_unknown_field() {
        let record = sample_task();
        let mut patch = Map::new();
        patch.insert("rent_amount".to_string(), json!("100"));
        let err = record.with_patch(&patch).expect_err("unknown field");
        assert!(matches!(err, EntityError::UnknownField { .. }));
    }

    #[test]
    fn patch_rejects_wrong_typed_value() {
        let record = sample_task();
        let mut patch = Map::new();
        patch.insert("estimated_hours".to_string(), json!("four"));
        let err = record.with_patch(&patch).expect_err("invalid value");
        assert!(matches!(err, EntityError::InvalidValue(_)));
    }

    #[test]
    fn patch_rejects_undeclared_status_label() {
        let record = sample_task();
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!("paused"));
        assert!(record.with_patch(&patch).is_err());
    }
}
