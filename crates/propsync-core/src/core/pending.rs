// crates/propsync-core/src/core/pending.rs
// ============================================================================
// Module: PropSync Pending Operations
// Description: Queued, not-yet-confirmed mutations retained for retry.
// Purpose: Capture failed mutations so they can be replayed later.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! When a mutation's gateway call fails after retries, the attempted change
//! is recorded as a pending operation. The lifecycle is created → retried →
//! removed on success, or retained with an incremented retry count and an
//! error message on repeated failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::entity::EntityKind;
use crate::core::identifiers::EntityId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Mutation kind captured by a pending operation.
///
/// # Invariants
/// - Variants are stable for serialization and replay dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create mutation.
    Create,
    /// Update mutation.
    Update,
    /// Soft-delete mutation.
    Delete,
}

/// Replay state of a pending operation.
///
/// # Invariants
/// - Variants are stable for serialization and user-facing display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Awaiting replay.
    Pending,
    /// Replay succeeded (entry is removed immediately after).
    Success,
    /// Replay failed; retained for another pass.
    Failed,
}

/// A queued, not-yet-confirmed mutation retained for retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Entity kind the mutation targets.
    pub entity_kind: EntityKind,
    /// Entity identifier, when the mutation targets an existing record.
    pub entity_id: Option<EntityId>,
    /// Mutation kind.
    pub operation: OperationKind,
    /// Attempted change payload (full record for creates, patch for updates).
    pub payload: Value,
    /// Replay state.
    pub status: PendingStatus,
    /// Number of failed replay attempts.
    pub retry_count: u32,
    /// Queue insertion time.
    pub created_at: Timestamp,
    /// Most recent failure message, if any.
    pub error_message: Option<String>,
}

impl PendingOperation {
    /// Creates a fresh pending entry for a failed mutation.
    #[must_use]
    pub fn new(
        entity_kind: EntityKind,
        entity_id: Option<EntityId>,
        operation: OperationKind,
        payload: Value,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            operation,
            payload,
            status: PendingStatus::Pending,
            retry_count: 0,
            created_at: Timestamp::now(),
            error_message: Some(error_message.into()),
        }
    }

    /// Marks a failed replay attempt.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = PendingStatus::Failed;
        self.retry_count += 1;
        self.error_message = Some(message.into());
    }
}
