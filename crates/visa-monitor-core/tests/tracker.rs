// crates/visa-monitor-core/tests/tracker.rs
// ============================================================================
// Module: LKVS Tracker Tests
// Description: State-machine and notification laws for the tracker.
// Purpose: Pin suppression, change detection, and Unknown policy behavior.
// Dependencies: visa-monitor-core, proptest
// ============================================================================

//! ## Overview
//! Exercises [`apply_reading`] across the documented transition table,
//! including the three-cycle failure-masking scenario and both Unknown
//! policies.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::NotificationIntent;
use visa_monitor_core::QueryCode;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::Timestamp;
use visa_monitor_core::TrackedCode;
use visa_monitor_core::TrackerPolicy;
use visa_monitor_core::UnknownPolicy;
use visa_monitor_core::apply_reading;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn ts(minutes: u32) -> Timestamp {
    Timestamp::from_unix_millis(1_750_000_000_000).unwrap().plus_minutes(minutes)
}

fn fresh() -> StatusSnapshot {
    let tracked = TrackedCode::email(QueryCode::new("PEKI202506020001"), "a@example.com");
    StatusSnapshot::pending(&tracked, ts(0))
}

fn with_lkvs(status: NormalizedStatus) -> StatusSnapshot {
    let mut snapshot = fresh();
    snapshot.status = Some(status);
    snapshot.last_known_valid_status = Some(status);
    snapshot.last_checked = Some(ts(0));
    snapshot.last_changed = Some(ts(0));
    snapshot
}

fn status_strategy() -> impl Strategy<Value = NormalizedStatus> {
    prop::sample::select(NormalizedStatus::ALL.to_vec())
}

// ============================================================================
// SECTION: Transition Table
// ============================================================================

#[test]
fn first_valid_reading_notifies_first_status() {
    let outcome = apply_reading(fresh(), NormalizedStatus::Proceedings, ts(1), TrackerPolicy::default());
    assert_eq!(
        outcome.notification,
        Some(NotificationIntent::FirstStatus {
            status: NormalizedStatus::Proceedings
        })
    );
    assert_eq!(outcome.snapshot.last_known_valid_status, Some(NormalizedStatus::Proceedings));
    assert_eq!(outcome.snapshot.last_changed, Some(ts(1)));
}

#[test]
fn first_not_found_is_silent_by_default() {
    let outcome = apply_reading(fresh(), NormalizedStatus::NotFound, ts(1), TrackerPolicy::default());
    assert_eq!(outcome.notification, None);
    assert_eq!(outcome.snapshot.last_known_valid_status, Some(NormalizedStatus::NotFound));

    let policy = TrackerPolicy {
        notify_first_not_found: true,
        ..TrackerPolicy::default()
    };
    let outcome = apply_reading(fresh(), NormalizedStatus::NotFound, ts(1), policy);
    assert!(outcome.notification.is_some());
}

#[test]
fn query_failed_increments_counter_and_keeps_lkvs() {
    let prior = with_lkvs(NormalizedStatus::Proceedings);
    let outcome = apply_reading(prior, NormalizedStatus::QueryFailed, ts(5), TrackerPolicy::default());
    assert_eq!(outcome.notification, None);
    assert_eq!(outcome.snapshot.status, Some(NormalizedStatus::QueryFailed));
    assert_eq!(outcome.snapshot.last_known_valid_status, Some(NormalizedStatus::Proceedings));
    assert_eq!(outcome.snapshot.consecutive_fail_count, 1);
    assert_eq!(outcome.snapshot.last_checked, Some(ts(5)));
    assert_eq!(outcome.snapshot.last_changed, Some(ts(0)));
}

#[test]
fn change_notifies_transition_and_resets_counter() {
    let mut prior = with_lkvs(NormalizedStatus::Proceedings);
    prior.consecutive_fail_count = 2;
    let outcome = apply_reading(prior, NormalizedStatus::Granted, ts(9), TrackerPolicy::default());
    assert_eq!(
        outcome.notification,
        Some(NotificationIntent::Transition {
            from: NormalizedStatus::Proceedings,
            to: NormalizedStatus::Granted,
        })
    );
    assert_eq!(outcome.snapshot.consecutive_fail_count, 0);
    assert_eq!(outcome.snapshot.last_changed, Some(ts(9)));
}

// ============================================================================
// SECTION: Three-Cycle Scenarios
// ============================================================================

#[test]
fn failure_between_identical_readings_is_silent() {
    let policy = TrackerPolicy::default();
    let first = apply_reading(fresh(), NormalizedStatus::Proceedings, ts(0), policy);
    assert!(first.notification.is_some());
    let second = apply_reading(first.snapshot, NormalizedStatus::QueryFailed, ts(60), policy);
    assert_eq!(second.notification, None);
    let third = apply_reading(second.snapshot, NormalizedStatus::Proceedings, ts(120), policy);
    assert_eq!(third.notification, None);
    assert_eq!(third.snapshot.consecutive_fail_count, 0);
    assert_eq!(third.snapshot.last_changed, Some(ts(0)));
}

#[test]
fn change_after_failure_is_reported_against_lkvs() {
    let policy = TrackerPolicy::default();
    let first = apply_reading(fresh(), NormalizedStatus::Proceedings, ts(0), policy);
    let second = apply_reading(first.snapshot, NormalizedStatus::QueryFailed, ts(60), policy);
    let third = apply_reading(second.snapshot, NormalizedStatus::Granted, ts(120), policy);
    assert_eq!(
        third.notification,
        Some(NotificationIntent::Transition {
            from: NormalizedStatus::Proceedings,
            to: NormalizedStatus::Granted,
        })
    );
}

// ============================================================================
// SECTION: Unknown Policy
// ============================================================================

#[test]
fn suppress_policy_hides_unknown() {
    let prior = with_lkvs(NormalizedStatus::Proceedings);
    let outcome = apply_reading(prior, NormalizedStatus::Unknown, ts(3), TrackerPolicy::default());
    assert_eq!(outcome.notification, None);
    assert_eq!(outcome.snapshot.status, Some(NormalizedStatus::Unknown));
    assert_eq!(outcome.snapshot.last_known_valid_status, Some(NormalizedStatus::Proceedings));
    assert_eq!(outcome.snapshot.consecutive_fail_count, 0);

    let back = apply_reading(outcome.snapshot, NormalizedStatus::Proceedings, ts(4), TrackerPolicy::default());
    assert_eq!(back.notification, None);
}

#[test]
fn suppressed_unknown_resets_failure_counter() {
    let policy = TrackerPolicy::default();
    let mut snapshot = fresh();
    let readings = [
        NormalizedStatus::Proceedings,
        NormalizedStatus::QueryFailed,
        NormalizedStatus::QueryFailed,
    ];
    for (minute, reading) in (0_u32 ..).zip(readings) {
        snapshot = apply_reading(snapshot, reading, ts(minute), policy).snapshot;
    }
    assert_eq!(snapshot.consecutive_fail_count, 2);

    let outcome = apply_reading(snapshot, NormalizedStatus::Unknown, ts(3), policy);
    assert_eq!(outcome.notification, None);
    assert_eq!(outcome.snapshot.status, Some(NormalizedStatus::Unknown));
    assert_eq!(outcome.snapshot.last_known_valid_status, Some(NormalizedStatus::Proceedings));
    assert_eq!(outcome.snapshot.consecutive_fail_count, 0);
}

#[test]
fn track_policy_treats_unknown_as_valid() {
    let policy = TrackerPolicy {
        unknown: UnknownPolicy::Track,
        ..TrackerPolicy::default()
    };
    let prior = with_lkvs(NormalizedStatus::Proceedings);
    let outcome = apply_reading(prior, NormalizedStatus::Unknown, ts(3), policy);
    assert_eq!(
        outcome.notification,
        Some(NotificationIntent::Transition {
            from: NormalizedStatus::Proceedings,
            to: NormalizedStatus::Unknown,
        })
    );
    assert_eq!(outcome.snapshot.last_known_valid_status, Some(NormalizedStatus::Unknown));
}

#[test]
fn unknown_policy_parses_labels() {
    assert_eq!(UnknownPolicy::parse("Track"), Some(UnknownPolicy::Track));
    assert_eq!(UnknownPolicy::parse("suppress"), Some(UnknownPolicy::Suppress));
    assert_eq!(UnknownPolicy::parse("ignore"), None);
}

// ============================================================================
// SECTION: Laws
// ============================================================================

proptest! {
    #[test]
    fn lkvs_is_never_query_failed(readings in prop::collection::vec(status_strategy(), 1 .. 12)) {
        let mut snapshot = fresh();
        for (index, reading) in readings.into_iter().enumerate() {
            let minute = u32::try_from(index).unwrap();
            snapshot = apply_reading(snapshot, reading, ts(minute), TrackerPolicy::default()).snapshot;
            prop_assert_ne!(snapshot.last_known_valid_status, Some(NormalizedStatus::QueryFailed));
        }
    }

    #[test]
    fn repeated_reading_never_notifies(status in status_strategy(), track in any::<bool>()) {
        let policy = TrackerPolicy {
            unknown: if track { UnknownPolicy::Track } else { UnknownPolicy::Suppress },
            notify_first_not_found: true,
        };
        let first = apply_reading(fresh(), status, ts(0), policy);
        let second = apply_reading(first.snapshot, status, ts(60), policy);
        prop_assert_eq!(second.notification, None);
    }

    #[test]
    fn failures_never_notify(status in status_strategy(), failures in 1_usize .. 6) {
        let policy = TrackerPolicy::default();
        let mut snapshot = apply_reading(fresh(), status, ts(0), policy).snapshot;
        for _ in 0 .. failures {
            let outcome = apply_reading(snapshot, NormalizedStatus::QueryFailed, ts(1), policy);
            prop_assert_eq!(outcome.notification, None);
            snapshot = outcome.snapshot;
        }
        let expected = failures + usize::from(status == NormalizedStatus::QueryFailed);
        prop_assert_eq!(usize::try_from(snapshot.consecutive_fail_count).unwrap(), expected);
    }
}
