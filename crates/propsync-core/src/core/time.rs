// crates/propsync-core/src/core/time.rs
// ============================================================================
// Module: PropSync Time Model
// Description: Canonical timestamp representation for entity metadata.
// Purpose: Provide a single, serializable unix-millisecond timestamp type.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Entity metadata and audit rows carry explicit unix-millisecond
//! timestamps. `updated_at` advances on every mutation; monotonicity across
//! hosts is not guaranteed and is never relied on for correctness.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix-millisecond timestamp used in entity metadata and audit rows.
///
/// # Invariants
/// - Values are milliseconds since the unix epoch; no timezone is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time as a timestamp.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::Timestamp;

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now().as_unix_millis() > 0);
    }

    #[test]
    fn serializes_as_bare_integer() {
        let ts = Timestamp::from_unix_millis(1_700_000_000_000);
        assert_eq!(serde_json::to_string(&ts).expect("serialize"), "1700000000000");
    }
}
