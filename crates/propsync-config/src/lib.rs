// crates/propsync-config/src/lib.rs
// ============================================================================
// Module: PropSync Config Library
// Description: Canonical configuration model with strict loading rules.
// Purpose: Centralize config parsing and fail-closed validation.
// Dependencies: propsync-store-sqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! One TOML file configures the whole backend: server bind and body
//! limits, store selection (memory or `SQLite`), gateway retry bounds, and
//! realtime reconnect bounds. Loading is strict (path limits, size limit,
//! UTF-8, unknown keys rejected) and `validate()` fails closed on any
//! out-of-range field.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::PropsyncConfig;
pub use config::RetrySectionConfig;
pub use config::ServerConfig;
pub use config::StoreSectionConfig;
pub use config::StoreType;
pub use config::SyncSectionConfig;
