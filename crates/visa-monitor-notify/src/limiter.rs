// crates/visa-monitor-notify/src/limiter.rs
// ============================================================================
// Module: Sliding Window Limiter
// Description: Count-based rate limit over a trailing time window.
// Purpose: Cap ordinary email volume and per-client API request rates.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`SlidingWindow`] admits at most `limit` events in any trailing window.
//! The caller supplies the clock so paused-time tests stay deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Trailing-window event counter.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Maximum events per window; zero disables the limit.
    limit: usize,
    /// Window length.
    window: Duration,
    /// Admission times inside the window, oldest first.
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Creates a limiter admitting `limit` events per `window`.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: usize::try_from(limit).unwrap_or(usize::MAX),
            window,
            hits: VecDeque::new(),
        }
    }

    /// Creates a per-minute limiter.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Changes the limit, keeping admissions already in the window.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = usize::try_from(limit).unwrap_or(usize::MAX);
    }

    /// Admits an event at `now`, or returns how long until a slot frees.
    ///
    /// # Errors
    ///
    /// Returns the wait duration when the window is full.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        if self.limit == 0 {
            return Ok(());
        }
        self.evict(now);
        if self.hits.len() < self.limit {
            self.hits.push_back(now);
            return Ok(());
        }
        let oldest = self.hits.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Returns the number of admitted events still inside the window.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.hits.len()
    }

    /// Returns true when no admissions remain in the window.
    pub fn is_idle(&mut self, now: Instant) -> bool {
        self.in_window(now) == 0
    }

    /// Drops admissions older than the window.
    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.hits.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
