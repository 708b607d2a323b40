// crates/propsync-core/src/runtime/mutation.rs
// ============================================================================
// Module: PropSync Mutation Snapshots
// Description: Pre-mutation snapshots and pure rollback over a collection.
// Purpose: Make rollback a function of the snapshot, not call-site logic.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Every optimistic mutation captures a [`MutationSnapshot`] before
//! touching local state. Rolling back is a pure function of that snapshot
//! against the collection, so every failure path restores state the same
//! way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::entity::EntityRecord;
use crate::core::identifiers::EntityId;

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Snapshot of local state taken before an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationSnapshot {
    /// An optimistic insert; rollback removes the synthesized record.
    Created {
        /// Locally synthesized identifier.
        id: EntityId,
    },
    /// An optimistic merge; rollback restores the pre-mutation record.
    Updated {
        /// Pre-mutation record.
        record: EntityRecord,
    },
    /// An optimistic removal; rollback re-inserts at the original position.
    Removed {
        /// Removed record.
        record: EntityRecord,
        /// Original position in the collection.
        index: usize,
    },
}

/// Restores a collection to its pre-mutation state.
pub fn rollback(records: &mut Vec<EntityRecord>, snapshot: MutationSnapshot) {
    match snapshot {
        MutationSnapshot::Created {
            id,
        } => {
            records.retain(|record| record.meta.id != id);
        }
        MutationSnapshot::Updated {
            record,
        } => {
            if let Some(slot) = records.iter_mut().find(|slot| slot.meta.id == record.meta.id) {
                *slot = record;
            }
        }
        MutationSnapshot::Removed {
            record,
            index,
        } => {
            let position = index.min(records.len());
            records.insert(position, record);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::*;
    use crate::core::entity::EntityBody;
    use crate::core::entity::EntityMeta;
    use crate::core::entity::TaskBody;
    use crate::core::identifiers::UserId;
    use crate::core::status::TaskStatus;
    use crate::core::time::Timestamp;

    fn task(id: &str, title: &str) -> EntityRecord {
        EntityRecord {
            meta: EntityMeta::new(
                EntityId::new(id),
                UserId::system(),
                Timestamp::from_unix_millis(1),
            ),
            body: EntityBody::Task(TaskBody {
                title: title.to_string(),
                assignee: None,
                parent_workflow_id: None,
                blocker_reason: None,
                estimated_hours: None,
                actual_hours: None,
                status: TaskStatus::Todo,
            }),
        }
    }

    #[test]
    fn rollback_of_create_removes_record() {
        let mut records = vec![task("a", "one"), task("b", "two")];
        rollback(&mut records, MutationSnapshot::Created {
            id: EntityId::new("b"),
        });
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].meta.id.as_str(), "a");
    }

    #[test]
    fn rollback_of_update_restores_snapshot() {
        let mut records = vec![task("a", "changed")];
        rollback(&mut records, MutationSnapshot::Updated {
            record: task("a", "original"),
        });
        match &records[0].body {
            EntityBody::Task(body) => assert_eq!(body.title, "original"),
            _ => panic!("kind changed"),
        }
    }

    #[test]
    fn rollback_of_remove_reinserts_at_index() {
        let mut records = vec![task("a", "one"), task("c", "three")];
        rollback(&mut records, MutationSnapshot::Removed {
            record: task("b", "two"),
            index: 1,
        });
        let ids: Vec<&str> = records.iter().map(|record| record.meta.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn rollback_of_remove_clamps_out_of_range_index() {
        let mut records = vec![task("a", "one")];
        rollback(&mut records, MutationSnapshot::Removed {
            record: task("b", "two"),
            index: 9,
        });
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].meta.id.as_str(), "b");
    }
}
