// crates/visa-monitor-runtime/src/clock.rs
// ============================================================================
// Module: Clock
// Description: Wall-clock source for scheduling and record timestamps.
// Purpose: Let tests drive multi-cycle scenarios with explicit times.
// Dependencies: visa-monitor-core
// ============================================================================

//! ## Overview
//! Production code reads [`SystemClock`]; tests use [`ManualClock`] and
//! advance it between cycles.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use visa_monitor_core::Timestamp;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now_utc()
    }
}

/// Manually advanced clock.
pub struct ManualClock {
    /// Current time.
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `minutes`.
    pub fn advance_minutes(&self, minutes: u32) {
        if let Ok(mut now) = self.now.lock() {
            *now = now.plus_minutes(minutes);
        }
    }

    /// Sets the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.lock().map_or_else(|_| Timestamp::now_utc(), |now| *now)
    }
}
