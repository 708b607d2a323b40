// crates/propsync-store-sqlite/src/lib.rs
// ============================================================================
// Module: PropSync SQLite Store Library
// Description: Durable entity gateway and audit recorder backed by SQLite.
// Purpose: Persist entity records and the audit trail across restarts.
// Dependencies: propsync-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! SQLite-backed implementations of the PropSync gateway and audit
//! recorder. Records are stored as flat JSON rows alongside indexed
//! metadata columns; the audit trail is an append-only table. The schema
//! carries a version row and opening fails closed on a mismatch.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
