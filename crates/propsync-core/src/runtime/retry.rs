// crates/propsync-core/src/runtime/retry.rs
// ============================================================================
// Module: PropSync Retry Policy
// Description: Bounded retry with exponential backoff for gateway calls.
// Purpose: Retry transient gateway failures; never retry rejections.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! Gateway calls are retried up to a fixed attempt count with exponential
//! backoff (base delay doubling per attempt) and no overall deadline. Only
//! transient failures are retried; invalid or not-found responses surface
//! immediately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use crate::interfaces::GatewayError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default attempt count for gateway calls.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff base delay.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Bounded exponential-backoff retry policy.
///
/// # Invariants
/// - `max_attempts` is at least 1.
/// - Delay before attempt `n` (0-based, n >= 1) is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base delay.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit bounds.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            base_delay,
        }
    }

    /// Returns the backoff delay preceding the given 1-based retry attempt.
    #[must_use]
    pub const fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Runs an operation, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns the final [`GatewayError`] after attempts are exhausted, or
    /// the first non-retryable error immediately.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_limit() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result: Result<(), GatewayError> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::Unavailable("down".to_string())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result: Result<(), GatewayError> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::Invalid("bad patch".to_string())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(GatewayError::Io("flaky".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.expect("second attempt succeeds"), 1);
    }
}
