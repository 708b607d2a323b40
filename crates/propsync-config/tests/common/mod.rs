//! Shared helpers for propsync-config tests.
// crates/propsync-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Minimal valid configuration builders.
// Purpose: Keep validation tests focused on the field under test.
// =============================================================================

use propsync_config::PropsyncConfig;

/// Returns a minimal configuration that passes validation.
pub fn minimal_config() -> Result<PropsyncConfig, String> {
    let config = PropsyncConfig::default();
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}
