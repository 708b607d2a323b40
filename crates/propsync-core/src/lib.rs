// crates/propsync-core/src/lib.rs
// ============================================================================
// Module: PropSync Core Library
// Description: Entity model, transition rules, interfaces, and store runtime.
// Purpose: Provide the backend-agnostic core used by every PropSync crate.
// Dependencies: serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! PropSync core defines the versioned, soft-deletable entity model, the
//! per-kind status transition graph, the audit-trail and pending-operation
//! types, the gateway/audit interfaces, and the optimistic [`EntityStore`]
//! runtime that applies mutations locally before server confirmation and
//! rolls back on failure.
//!
//! Invariants:
//! - `version` advances by exactly 1 per accepted update and is never used
//!   as a compare-and-swap precondition; concurrent writers race and the
//!   last write observed wins.
//! - Soft-deleted records are excluded from listings but retained for the
//!   audit trail.
//! - Status changes are legal only along declared transition edges.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::audit::AuditOperation;
pub use crate::core::audit::AuditTrailEntry;
pub use crate::core::audit::FieldEquality;
pub use crate::core::audit::ValueEquality;
pub use crate::core::audit::audit_rows_for_create;
pub use crate::core::audit::audit_rows_for_delete;
pub use crate::core::audit::audit_rows_for_update;
pub use crate::core::conflict::ConflictKind;
pub use crate::core::conflict::EntityConflict;
pub use crate::core::conflict::check_version_conflict;
pub use crate::core::entity::EntityBody;
pub use crate::core::entity::EntityError;
pub use crate::core::entity::EntityKind;
pub use crate::core::entity::EntityMeta;
pub use crate::core::entity::EntityRecord;
pub use crate::core::entity::LeaseBody;
pub use crate::core::entity::MaintenanceBody;
pub use crate::core::entity::Priority;
pub use crate::core::entity::TaskBody;
pub use crate::core::entity::WorkflowBody;
pub use crate::core::identifiers::ClientId;
pub use crate::core::identifiers::EntityId;
pub use crate::core::identifiers::UserId;
pub use crate::core::pending::OperationKind;
pub use crate::core::pending::PendingOperation;
pub use crate::core::pending::PendingStatus;
pub use crate::core::status::LeaseStatus;
pub use crate::core::status::MaintenanceStatus;
pub use crate::core::status::TaskStatus;
pub use crate::core::status::WorkflowStatus;
pub use crate::core::status::initial_status;
pub use crate::core::status::status_domain;
pub use crate::core::status::valid_transitions;
pub use crate::core::status::validate_transition;
pub use crate::core::time::Timestamp;
pub use interfaces::AuditError;
pub use interfaces::AuditRecorder;
pub use interfaces::ChangeNotifier;
pub use interfaces::ChangeOp;
pub use interfaces::EntityChange;
pub use interfaces::EntityGateway;
pub use interfaces::GatewayError;
pub use interfaces::ListFilter;
pub use interfaces::NoopNotifier;
pub use interfaces::SyncStatus;
pub use runtime::memory::MemoryAuditLog;
pub use runtime::memory::MemoryGateway;
pub use runtime::retry::RetryPolicy;
pub use runtime::store::BulkStatusOutcome;
pub use runtime::store::EntityStore;
pub use runtime::store::StoreError;
