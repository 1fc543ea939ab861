// crates/visa-monitor-core/src/runtime/scheduler.rs
// ============================================================================
// Module: Visa Monitor Differential Scheduler
// Description: Due-code selection, failure backoff, and tracked-set diffs.
// Purpose: Decide which codes a cycle checks and how long to sleep after it.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Scheduling is a pure function of the tracked set, the stored snapshots,
//! and a caller-supplied `now`. A code is due when it has never been checked
//! or when its interval has fully elapsed since the last check. Settled
//! (granted) codes are never due.
//!
//! ## Invariants
//! - Interval comparison is inclusive: exactly one interval after the last
//!   check is due, one minute less is not.
//! - After the first three consecutive failures the interval shrinks to
//!   `min(2^(n-1), freq)` minutes, then returns to `freq`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::core::NormalizedStatus;
use crate::core::QueryCode;
use crate::core::StatusSnapshot;
use crate::core::Timestamp;
use crate::core::TrackedCode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Consecutive failures that receive a shortened retry interval.
pub const BACKOFF_FAILURES: u32 = 3;
/// Wait when nothing is tracked.
pub const EMPTY_WAIT: Duration = Duration::from_secs(60);
/// Lower bound for the inter-cycle wait.
pub const MIN_WAIT: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Due Computation
// ============================================================================

/// Returns true when the stored state needs no further polling.
#[must_use]
pub fn is_settled(snapshot: Option<&StatusSnapshot>) -> bool {
    snapshot.is_some_and(|snapshot| {
        snapshot.status.is_some_and(NormalizedStatus::is_terminal)
            || snapshot.last_known_valid_status.is_some_and(NormalizedStatus::is_terminal)
    })
}

/// Returns the interval in minutes until the next check of `snapshot`.
#[must_use]
pub fn interval_minutes(snapshot: &StatusSnapshot, freq_minutes: u32) -> u32 {
    let failures = snapshot.consecutive_fail_count;
    let failing = snapshot.status == Some(NormalizedStatus::QueryFailed);
    if failing && (1 ..= BACKOFF_FAILURES).contains(&failures) {
        let backoff = 1_u32 << (failures - 1);
        return backoff.min(freq_minutes).max(1);
    }
    freq_minutes.max(1)
}

/// Returns the time the code becomes due, or `None` when due immediately.
#[must_use]
pub fn next_check_at(snapshot: &StatusSnapshot, freq_minutes: u32) -> Option<Timestamp> {
    let last_checked = snapshot.last_checked?;
    Some(last_checked.plus_minutes(interval_minutes(snapshot, freq_minutes)))
}

/// Returns true when `tracked` should be checked at `now`.
#[must_use]
pub fn is_due(
    tracked: &TrackedCode,
    snapshot: Option<&StatusSnapshot>,
    default_freq_minutes: u32,
    now: Timestamp,
) -> bool {
    if is_settled(snapshot) {
        return false;
    }
    let Some(snapshot) = snapshot else {
        return true;
    };
    let freq = tracked.effective_freq(default_freq_minutes);
    next_check_at(snapshot, freq).is_none_or(|due_at| now >= due_at)
}

/// Returns the due codes in declaration order.
#[must_use]
pub fn due_codes<'a>(
    tracked: &'a [TrackedCode],
    snapshots: &BTreeMap<QueryCode, StatusSnapshot>,
    default_freq_minutes: u32,
    now: Timestamp,
) -> Vec<&'a TrackedCode> {
    tracked
        .iter()
        .filter(|code| is_due(code, snapshots.get(&code.code), default_freq_minutes, now))
        .collect()
}

/// Returns how long to wait before the next cycle.
///
/// The wait is the time until the earliest due code, capped by
/// `poll_interval` and clamped to [`MIN_WAIT`]. With nothing to poll the
/// wait is [`EMPTY_WAIT`].
#[must_use]
pub fn next_wait(
    tracked: &[TrackedCode],
    snapshots: &BTreeMap<QueryCode, StatusSnapshot>,
    default_freq_minutes: u32,
    poll_interval: Duration,
    now: Timestamp,
) -> Duration {
    let mut earliest: Option<Duration> = None;
    let mut active = false;
    for code in tracked {
        let snapshot = snapshots.get(&code.code);
        if is_settled(snapshot) {
            continue;
        }
        active = true;
        let until = snapshot
            .and_then(|snapshot| next_check_at(snapshot, code.effective_freq(default_freq_minutes)))
            .map_or(Duration::ZERO, |due_at| {
                Duration::try_from(due_at.since(now)).unwrap_or(Duration::ZERO)
            });
        earliest = Some(earliest.map_or(until, |current| current.min(until)));
    }
    if !active {
        return EMPTY_WAIT;
    }
    earliest.unwrap_or(poll_interval).min(poll_interval).max(MIN_WAIT)
}

// ============================================================================
// SECTION: Tracked-Set Diff
// ============================================================================

/// Fields that differ between two declarations of the same code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChange {
    /// Affected code.
    pub code: QueryCode,
    /// Names of the changed fields.
    pub fields: Vec<&'static str>,
}

/// Difference between two tracked sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSetDiff {
    /// Codes present only in the new set.
    pub added: Vec<QueryCode>,
    /// Codes present only in the old set.
    pub removed: Vec<QueryCode>,
    /// Codes present in both with changed settings.
    pub modified: Vec<CodeChange>,
}

impl TrackedSetDiff {
    /// Returns true when nothing changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Computes the difference from `previous` to `current`.
#[must_use]
pub fn diff_tracked(previous: &[TrackedCode], current: &[TrackedCode]) -> TrackedSetDiff {
    let old: BTreeMap<&QueryCode, &TrackedCode> =
        previous.iter().map(|code| (&code.code, code)).collect();
    let new_codes: BTreeSet<&QueryCode> = current.iter().map(|code| &code.code).collect();
    let mut diff = TrackedSetDiff::default();
    for code in current {
        match old.get(&code.code) {
            None => diff.added.push(code.code.clone()),
            Some(before) => {
                let fields = changed_fields(before, code);
                if !fields.is_empty() {
                    diff.modified.push(CodeChange {
                        code: code.code.clone(),
                        fields,
                    });
                }
            }
        }
    }
    for code in previous {
        if !new_codes.contains(&code.code) {
            diff.removed.push(code.code.clone());
        }
    }
    diff
}

/// Lists the setting names that differ.
fn changed_fields(before: &TrackedCode, after: &TrackedCode) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if before.freq_minutes != after.freq_minutes {
        fields.push("freq_minutes");
    }
    if before.target != after.target {
        fields.push("target");
    }
    if before.channel != after.channel {
        fields.push("channel");
    }
    if before.note != after.note {
        fields.push("note");
    }
    if before.query_type != after.query_type {
        fields.push("query_type");
    }
    fields
}
