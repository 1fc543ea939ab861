// crates/visa-monitor-core/src/runtime/retry.rs
// ============================================================================
// Module: Visa Monitor Retry Policy
// Description: Single retry budget applied at the executor boundary.
// Purpose: Keep attempt counts and delays in one value instead of call sites.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`RetryPolicy`] describes how many times a portal check is attempted and
//! how long to wait between attempts. Delay grows linearly with the attempt
//! number plus a bounded jitter sample supplied by the caller, so the policy
//! itself stays deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default attempt budget per check.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default fixed part of the retry delay.
pub const DEFAULT_BASE_DELAY_MS: u64 = 800;
/// Default per-attempt increment of the retry delay.
pub const DEFAULT_STEP_DELAY_MS: u64 = 200;
/// Default upper bound for retry jitter.
pub const DEFAULT_JITTER_MS: u64 = 50;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Retry budget for one portal check.
///
/// # Invariants
/// - `max_attempts >= 1`; a value of 0 is treated as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay before any retry.
    pub base_delay: Duration,
    /// Additional delay per failed attempt.
    pub step_delay: Duration,
    /// Upper bound for the caller-supplied jitter sample.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            step_delay: Duration::from_millis(DEFAULT_STEP_DELAY_MS),
            jitter: Duration::from_millis(DEFAULT_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Returns the attempt budget, at least one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 { 1 } else { self.max_attempts }
    }

    /// Returns true when another attempt is allowed after `attempt` failed.
    ///
    /// `attempt` is 1-based.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// Returns the wait before the attempt following failed `attempt`.
    ///
    /// `jitter_sample` is clamped to the configured jitter bound.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, jitter_sample: Duration) -> Duration {
        self.base_delay
            .saturating_add(self.step_delay.saturating_mul(attempt))
            .saturating_add(jitter_sample.min(self.jitter))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
