// crates/visa-monitor-core/src/core/time.rs
// ============================================================================
// Module: Visa Monitor Time Model
// Description: Canonical timestamp representation for snapshots and schedules.
// Purpose: Keep scheduling math deterministic by passing time in explicitly.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The core never reads the wall clock. Hosts supply a [`Timestamp`] for every
//! decision (due computation, LKVS transitions, expiry checks), which keeps the
//! scheduler and tracker replayable in tests. Timestamps persist as RFC 3339
//! strings so the status files stay readable by the public status page.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in snapshots, user records, and schedules.
///
/// # Invariants
/// - Values are supplied by callers; the core never samples the clock.
/// - Serialized form is RFC 3339 with the original offset preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Wraps an existing [`OffsetDateTime`].
    #[must_use]
    pub const fn new(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Samples the current UTC time. Only hosts should call this.
    #[must_use]
    pub fn now_utc() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Builds a timestamp from unix epoch milliseconds.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        let nanos = i128::from(millis).checked_mul(1_000_000)?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok().map(Self)
    }

    /// Parses an RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns [`time::error::Parse`] when the input is not RFC 3339.
    pub fn parse_rfc3339(value: &str) -> Result<Self, time::error::Parse> {
        OffsetDateTime::parse(value.trim(), &Rfc3339).map(Self)
    }

    /// Returns the wrapped date-time value.
    #[must_use]
    pub const fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns unix epoch milliseconds.
    #[must_use]
    pub fn unix_millis(&self) -> i128 {
        self.0.unix_timestamp_nanos() / 1_000_000
    }

    /// Returns the timestamp shifted forward by `minutes`.
    #[must_use]
    pub fn plus_minutes(&self, minutes: u32) -> Self {
        Self(self.0.saturating_add(Duration::minutes(i64::from(minutes))))
    }

    /// Returns the timestamp shifted forward by `duration`.
    #[must_use]
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration))
    }

    /// Returns the signed duration elapsed from `earlier` to `self`.
    #[must_use]
    pub fn since(&self, earlier: Self) -> Duration {
        self.0 - earlier.0
    }

    /// Formats the timestamp as RFC 3339.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn rfc3339_round_trips_through_serde() {
        let ts = Timestamp::parse_rfc3339("2025-06-02T08:30:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2025-06-02T08:30:00Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn plus_minutes_and_since_agree() {
        let base = Timestamp::from_unix_millis(1_700_000_000_000).unwrap();
        let later = base.plus_minutes(60);
        assert_eq!(later.since(base), Duration::minutes(60));
    }
}
