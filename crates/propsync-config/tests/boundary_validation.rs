//! Boundary validation tests for propsync-config.
// crates/propsync-config/tests/boundary_validation.rs
// =============================================================================
// Module: Boundary Validation Tests
// Description: Comprehensive tests for min/max boundaries and edge cases.
// Purpose: Ensure all numeric and cross-field constraints fail closed.
// =============================================================================

use std::path::PathBuf;

use propsync_config::ConfigError;
use propsync_config::StoreType;

mod common;

type TestResult = Result<(), String>;

/// Assert that a validation result is an error containing a specific substring.
fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn bind_must_parse_as_socket_address() -> TestResult {
    let mut config = common::minimal_config()?;
    config.server.bind = "not-an-address".to_string();
    assert_invalid(config.validate(), "server.bind must be a socket address")?;
    Ok(())
}

#[test]
fn max_body_bytes_at_minimum_1() -> TestResult {
    let mut config = common::minimal_config()?;
    config.server.max_body_bytes = 1;
    config.validate().map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn max_body_bytes_at_zero_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.server.max_body_bytes = 0;
    assert_invalid(config.validate(), "max_body_bytes must be greater than zero")?;
    Ok(())
}

#[test]
fn sqlite_store_requires_path() -> TestResult {
    let mut config = common::minimal_config()?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = None;
    assert_invalid(config.validate(), "store.path is required for sqlite")?;
    Ok(())
}

#[test]
fn sqlite_store_with_path_is_valid() -> TestResult {
    let mut config = common::minimal_config()?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(PathBuf::from("data/propsync.db"));
    config.validate().map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn busy_timeout_at_zero_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.store.busy_timeout_ms = 0;
    assert_invalid(config.validate(), "busy_timeout_ms must be greater than zero")?;
    Ok(())
}

#[test]
fn retry_attempts_at_zero_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.retry.max_attempts = 0;
    assert_invalid(config.validate(), "retry.max_attempts must be at least 1")?;
    Ok(())
}

#[test]
fn retry_base_delay_at_zero_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.retry.base_delay_ms = 0;
    assert_invalid(config.validate(), "retry.base_delay_ms out of range")?;
    Ok(())
}

#[test]
fn retry_base_delay_above_ceiling_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.retry.base_delay_ms = 60_001;
    assert_invalid(config.validate(), "retry.base_delay_ms out of range")?;
    Ok(())
}

#[test]
fn retry_base_delay_at_ceiling_is_valid() -> TestResult {
    let mut config = common::minimal_config()?;
    config.retry.base_delay_ms = 60_000;
    config.validate().map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn reconnect_attempts_at_zero_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.sync.max_reconnect_attempts = 0;
    assert_invalid(config.validate(), "sync.max_reconnect_attempts out of range")?;
    Ok(())
}

#[test]
fn reconnect_attempts_above_ceiling_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.sync.max_reconnect_attempts = 101;
    assert_invalid(config.validate(), "sync.max_reconnect_attempts out of range")?;
    Ok(())
}

#[test]
fn reconnect_base_delay_out_of_range_rejected() -> TestResult {
    let mut config = common::minimal_config()?;
    config.sync.reconnect_base_delay_ms = 0;
    assert_invalid(config.validate(), "sync.reconnect_base_delay_ms out of range")?;
    Ok(())
}

#[test]
fn retry_section_builds_policy() -> TestResult {
    let config = common::minimal_config()?;
    let policy = config.retry.policy();
    if policy.max_attempts != 3 {
        return Err("default attempts not mapped".to_string());
    }
    if policy.base_delay.as_millis() != 1_000 {
        return Err("default base delay not mapped".to_string());
    }
    Ok(())
}
