// crates/propsync-core/tests/transition_props.rs
// ============================================================================
// Module: PropSync Transition Property Tests
// Description: Property-based checks over the status transition graph.
// Purpose: Verify graph closure, terminality, and validation consistency.
// Dependencies: propsync-core, proptest
// ============================================================================

//! Property-based checks over the status transition graph.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

use propsync_core::EntityKind;
use propsync_core::initial_status;
use propsync_core::status_domain;
use propsync_core::valid_transitions;
use propsync_core::validate_transition;
use proptest::prelude::*;

/// Every kind under test.
const KINDS: [EntityKind; 4] =
    [EntityKind::Workflow, EntityKind::Lease, EntityKind::Task, EntityKind::Maintenance];

/// Strategy producing a kind and one status from its domain.
fn kind_and_status() -> impl Strategy<Value = (EntityKind, &'static str)> {
    (0usize..KINDS.len()).prop_flat_map(|k| {
        let kind = KINDS[k];
        let domain = status_domain(kind);
        (0usize..domain.len()).prop_map(move |s| (kind, domain[s]))
    })
}

proptest! {
    #[test]
    fn transitions_stay_inside_the_domain((kind, from) in kind_and_status()) {
        let domain = status_domain(kind);
        for target in valid_transitions(kind, from) {
            prop_assert!(domain.contains(target), "{target} outside {kind:?} domain");
        }
    }

    #[test]
    fn no_status_transitions_to_itself((kind, from) in kind_and_status()) {
        prop_assert!(!valid_transitions(kind, from).contains(&from));
    }

    #[test]
    fn validation_matches_the_edge_list((kind, from) in kind_and_status()) {
        for to in status_domain(kind) {
            let listed = valid_transitions(kind, from).contains(to);
            prop_assert_eq!(validate_transition(kind, from, to), listed);
        }
    }

    #[test]
    fn unknown_statuses_have_no_edges((kind, _from) in kind_and_status()) {
        prop_assert!(valid_transitions(kind, "no_such_status").is_empty());
        prop_assert!(!validate_transition(kind, "no_such_status", "draft"));
    }
}

#[test]
fn initial_status_is_in_the_domain() {
    for kind in KINDS {
        assert!(status_domain(kind).contains(&initial_status(kind)));
    }
}

#[test]
fn every_kind_has_a_terminal_status() {
    for kind in KINDS {
        let terminal = status_domain(kind)
            .iter()
            .any(|status| valid_transitions(kind, status).is_empty());
        assert!(terminal, "{kind:?} has no terminal status");
    }
}
