// crates/propsync-server/src/lib.rs
// ============================================================================
// Module: PropSync Server Library
// Description: REST backend and realtime relay for property entities.
// Purpose: Expose the entity gateway and audit trail over HTTP and
//          WebSocket.
// Dependencies: axum, propsync-core, propsync-sync, serde_json
// ============================================================================

//! ## Overview
//! The server exposes per-kind entity collections under `/api`, an audit
//! history endpoint per record, a health endpoint, and a `/ws` upgrade
//! that joins the connection to the broadcast relay. Every JSON response
//! uses the `{success, data?|error?}` envelope; mutation attribution comes
//! from the `x-user-id` request header and defaults to the system user.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod router;
pub mod ws;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::ApiError;
pub use router::AppState;
pub use router::build_router;
