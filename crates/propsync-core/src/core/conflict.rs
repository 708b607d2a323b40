// crates/propsync-core/src/core/conflict.rs
// ============================================================================
// Module: PropSync Conflict Surfacing
// Description: Version-comparison conflicts surfaced during reconciliation.
// Purpose: Record concurrent-edit signals for display; never block a write.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Conflicts are a display/detection signal only. The reconciliation path
//! records an [`EntityConflict`] when an incoming remote version does not
//! advance the local one, then applies the remote row anyway: last write
//! observed wins everywhere. Nothing in PropSync enforces a
//! compare-and-swap precondition on writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::entity::EntityKind;
use crate::core::identifiers::EntityId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Conflict classification.
///
/// # Invariants
/// - Variants are stable for serialization and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Remote version did not advance the local version.
    VersionMismatch,
}

/// A surfaced concurrent-edit conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConflict {
    /// Entity kind involved.
    pub entity_kind: EntityKind,
    /// Entity identifier involved.
    pub entity_id: EntityId,
    /// Version held locally when the remote change arrived.
    pub local_version: u64,
    /// Version carried by the remote change.
    pub remote_version: u64,
    /// Local record snapshot at detection time.
    pub local_data: Value,
    /// Remote record payload at detection time.
    pub remote_data: Value,
    /// Conflict classification.
    pub conflict_type: ConflictKind,
}

// ============================================================================
// SECTION: Detection
// ============================================================================

/// Returns true when a remote version fails to advance the local version.
///
/// The result is a detection signal for surfacing; callers apply the remote
/// change regardless of the outcome.
#[must_use]
pub const fn check_version_conflict(local_version: u64, remote_version: u64) -> bool {
    remote_version <= local_version
}

// ============================================================================
// SECTION: Tests
// ============================================================================
