// crates/propsync-core/src/core/mod.rs
// ============================================================================
// Module: PropSync Core Model
// Description: Entity, status, audit, pending, and conflict types.
// Purpose: Group the data model modules behind one namespace.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The core model modules define every record shape PropSync persists or
//! puts on the wire. All types serialize with stable snake_case forms.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod conflict;
pub mod entity;
pub mod identifiers;
pub mod pending;
pub mod status;
pub mod time;
