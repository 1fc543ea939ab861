// crates/visa-monitor-core/src/runtime/tracker.rs
// ============================================================================
// Module: Visa Monitor LKVS Tracker
// Description: Reconciles a reading with the last known valid status.
// Purpose: Decide the next snapshot and whether the change is notification-worthy.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! The tracker is the notification-deduplication core. Each reading is
//! compared with the last known valid status (LKVS), never with the previous
//! raw reading, so a failed check in between two identical readings is
//! silent.
//!
//! ## Invariants
//! - `QueryFailed` never becomes the LKVS and never notifies.
//! - Identical consecutive valid readings never notify.
//! - Any reading other than `QueryFailed` resets the failure counter.
//! - Under [`UnknownPolicy::Suppress`], `Unknown` leaves the LKVS untouched
//!   and never notifies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::NormalizedStatus;
use crate::core::StatusSnapshot;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// How `Unknown` readings interact with the LKVS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
    /// `Unknown` is a valid status: stored as LKVS and notified on change.
    Track,
    /// `Unknown` is shown but otherwise ignored.
    #[default]
    Suppress,
}

impl UnknownPolicy {
    /// Parses a policy label.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "track" => Some(Self::Track),
            "suppress" => Some(Self::Suppress),
            _ => None,
        }
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Suppress => "suppress",
        }
    }
}

/// Tracker configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerPolicy {
    /// Treatment of `Unknown` readings.
    pub unknown: UnknownPolicy,
    /// Whether a first observation of `NotFound` notifies.
    pub notify_first_not_found: bool,
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// What the user should be told about a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationIntent {
    /// First valid status recorded for the code.
    FirstStatus {
        /// Recorded status.
        status: NormalizedStatus,
    },
    /// LKVS changed.
    Transition {
        /// Previous LKVS.
        from: NormalizedStatus,
        /// New LKVS.
        to: NormalizedStatus,
    },
}

impl NotificationIntent {
    /// Returns the status the notification announces.
    #[must_use]
    pub const fn current(&self) -> NormalizedStatus {
        match self {
            Self::FirstStatus {
                status,
            } => *status,
            Self::Transition {
                to, ..
            } => *to,
        }
    }

    /// Returns true for first-status notifications.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        matches!(self, Self::FirstStatus { .. })
    }
}

/// Result of applying one reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerOutcome {
    /// Snapshot to persist.
    pub snapshot: StatusSnapshot,
    /// Notification decision, independent of delivery settings.
    pub notification: Option<NotificationIntent>,
}

// ============================================================================
// SECTION: Reconciliation
// ============================================================================

/// Applies `reading` taken at `now` to `prior`.
#[must_use]
pub fn apply_reading(
    prior: StatusSnapshot,
    reading: NormalizedStatus,
    now: Timestamp,
    policy: TrackerPolicy,
) -> TrackerOutcome {
    let mut snapshot = prior;
    snapshot.status = Some(reading);
    snapshot.last_checked = Some(now);

    if reading == NormalizedStatus::QueryFailed {
        snapshot.consecutive_fail_count = snapshot.consecutive_fail_count.saturating_add(1);
        return TrackerOutcome {
            snapshot,
            notification: None,
        };
    }
    snapshot.consecutive_fail_count = 0;
    if reading == NormalizedStatus::Unknown && policy.unknown == UnknownPolicy::Suppress {
        return TrackerOutcome {
            snapshot,
            notification: None,
        };
    }

    let notification = match snapshot.last_known_valid_status {
        Some(previous) if previous == reading => None,
        Some(previous) => Some(NotificationIntent::Transition {
            from: previous,
            to: reading,
        }),
        None if reading == NormalizedStatus::NotFound && !policy.notify_first_not_found => None,
        None => Some(NotificationIntent::FirstStatus {
            status: reading,
        }),
    };
    if snapshot.last_known_valid_status != Some(reading) {
        snapshot.last_known_valid_status = Some(reading);
        snapshot.last_changed = Some(now);
    }
    TrackerOutcome {
        snapshot,
        notification,
    }
}
