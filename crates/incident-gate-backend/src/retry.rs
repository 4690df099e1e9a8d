// crates/incident-gate-backend/src/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Bounded exponential backoff for transient backend failures.
// Purpose: Cap total attempts and per-attempt delay.
// Dependencies: incident-gate-config
// ============================================================================

//! ## Overview
//! Only `RateLimited` and `Unavailable` failures are retried. The policy is a
//! pure function of the attempt number and an optional server hint so it can
//! be tested without a clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use incident_gate_config::RetryConfig;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Retry bounds for one backend call.
///
/// # Invariants
/// - `max_attempts >= 1`.
/// - No computed delay exceeds `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Builds a policy from configuration.
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Returns the delay before attempt `completed + 1`.
    ///
    /// `completed` is the number of attempts already made (1-based).
    #[must_use]
    pub fn delay_after(&self, completed: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint
            && hint <= self.max_backoff
        {
            return hint;
        }
        let exponent = completed.saturating_sub(1).min(16);
        let factor = 1u32 << exponent;
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Returns true when another attempt is permitted after `completed`.
    #[must_use]
    pub const fn allows_another(&self, completed: u32) -> bool {
        completed < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.delay_after(1, None), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2, None), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3, None), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4, None), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40, None), Duration::from_millis(500));
    }

    #[test]
    fn server_hint_is_used_within_cap() {
        let policy = policy();
        assert_eq!(policy.delay_after(1, Some(Duration::from_millis(300))), Duration::from_millis(300));
        assert_eq!(policy.delay_after(1, Some(Duration::from_secs(60))), Duration::from_millis(100));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = policy();
        assert!(policy.allows_another(4));
        assert!(!policy.allows_another(5));
        assert!(!RetryPolicy::single_attempt().allows_another(1));
    }
}
