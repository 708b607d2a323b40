// crates/propsync-core/src/core/status.rs
// ============================================================================
// Module: PropSync Status Transition Rules
// Description: Per-kind status enums and the legal transition graph.
// Purpose: Answer transition legality queries before any mutation is issued.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each entity kind declares a fixed directed graph of legal status
//! transitions. Terminal statuses have an empty outgoing set. The table is
//! the single authority for transition legality; callers must not layer ad
//! hoc guards on top of it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::entity::EntityKind;

// ============================================================================
// SECTION: Status Enums
// ============================================================================

/// Workflow lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and transition matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow is being drafted.
    Draft,
    /// Workflow is active.
    Active,
    /// Workflow is paused.
    Paused,
    /// Workflow has completed.
    Completed,
    /// Workflow is archived (terminal).
    Archived,
}

impl WorkflowStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

/// Lease lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and transition matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    /// Lease is being drafted.
    Draft,
    /// Lease is active.
    Active,
    /// Lease is approaching its end date.
    Expiring,
    /// Lease has expired (terminal).
    Expired,
    /// Lease has been renewed.
    Renewed,
}

impl LeaseStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Expiring => "expiring",
            Self::Expired => "expired",
            Self::Renewed => "renewed",
        }
    }
}

/// Task lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and transition matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been started.
    Todo,
    /// Task is in progress.
    InProgress,
    /// Task is blocked.
    Blocked,
    /// Task has completed (terminal).
    Completed,
}

impl TaskStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
        }
    }
}

/// Maintenance request lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and transition matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    /// Request has been submitted.
    Submitted,
    /// Request has been assigned.
    Assigned,
    /// Work is in progress.
    InProgress,
    /// Work has completed (terminal).
    Completed,
    /// Request was cancelled (terminal).
    Cancelled,
}

impl MaintenanceStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

// ============================================================================
// SECTION: Transition Tables
// ============================================================================

/// Returns the initial status label for an entity kind.
#[must_use]
pub const fn initial_status(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Workflow | EntityKind::Lease => "draft",
        EntityKind::Task => "todo",
        EntityKind::Maintenance => "submitted",
    }
}

/// Returns every declared status label for an entity kind.
#[must_use]
pub const fn status_domain(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Workflow => &["draft", "active", "paused", "completed", "archived"],
        EntityKind::Lease => &["draft", "active", "expiring", "expired", "renewed"],
        EntityKind::Task => &["todo", "in_progress", "blocked", "completed"],
        EntityKind::Maintenance => {
            &["submitted", "assigned", "in_progress", "completed", "cancelled"]
        }
    }
}

/// Returns the legal transition targets from a status.
///
/// Unknown statuses and terminal statuses both yield an empty set.
#[must_use]
pub fn valid_transitions(kind: EntityKind, from: &str) -> &'static [&'static str] {
    match kind {
        EntityKind::Workflow => workflow_transitions(from),
        EntityKind::Lease => lease_transitions(from),
        EntityKind::Task => task_transitions(from),
        EntityKind::Maintenance => maintenance_transitions(from),
    }
}

/// Returns true iff `to` is a declared transition target of `from`.
#[must_use]
pub fn validate_transition(kind: EntityKind, from: &str, to: &str) -> bool {
    valid_transitions(kind, from).iter().any(|target| *target == to)
}

/// Workflow transition edges.
fn workflow_transitions(from: &str) -> &'static [&'static str] {
    match from {
        "draft" => &["active", "archived"],
        "active" => &["paused", "completed", "archived"],
        "paused" => &["active", "archived"],
        "completed" => &["archived"],
        _ => &[],
    }
}

/// Lease transition edges.
fn lease_transitions(from: &str) -> &'static [&'static str] {
    match from {
        "draft" => &["active"],
        "active" => &["expiring"],
        "expiring" => &["expired", "renewed"],
        "renewed" => &["active"],
        _ => &[],
    }
}

/// Task transition edges.
fn task_transitions(from: &str) -> &'static [&'static str] {
    match from {
        "todo" => &["in_progress"],
        "in_progress" => &["blocked", "completed"],
        "blocked" => &["in_progress"],
        _ => &[],
    }
}

/// Maintenance transition edges.
fn maintenance_transitions(from: &str) -> &'static [&'static str] {
    match from {
        "submitted" => &["assigned", "cancelled"],
        "assigned" => &["in_progress", "cancelled"],
        "in_progress" => &["completed", "cancelled"],
        _ => &[],
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
