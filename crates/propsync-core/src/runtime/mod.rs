// crates/propsync-core/src/runtime/mod.rs
// ============================================================================
// Module: PropSync Runtime
// Description: Optimistic entity store, rollback, retry, and memory backends.
// Purpose: Group the client-side state management modules.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime holds the optimistic [`store::EntityStore`], the pure
//! rollback helpers, the bounded retry policy, and in-memory gateway/audit
//! implementations used by tests and the memory deployment mode.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;
pub mod mutation;
pub mod retry;
pub mod store;
