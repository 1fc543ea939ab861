// crates/visa-monitor-core/tests/store.rs
// ============================================================================
// Module: In-Memory Store Tests
// Description: Snapshot store read-modify-write behavior.
// Purpose: Ensure per-code updates leave other snapshots untouched.
// Dependencies: visa-monitor-core
// ============================================================================

//! ## Overview
//! Exercises the provided `update` path of [`SnapshotStore`].

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

use visa_monitor_core::InMemorySnapshotStore;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::Timestamp;
use visa_monitor_core::TrackedCode;

#[test]
fn update_replaces_only_the_target_code() {
    let now = Timestamp::from_unix_millis(1_750_000_000_000).unwrap();
    let store = InMemorySnapshotStore::new();
    let first = TrackedCode::email(QueryCode::new("PEKI202506020001"), "a@example.com");
    let second = TrackedCode::email(QueryCode::new("PEKI202506020002"), "b@example.com");
    store.update(&StatusSnapshot::pending(&first, now), now).unwrap();
    store.update(&StatusSnapshot::pending(&second, now), now).unwrap();

    let mut changed = StatusSnapshot::pending(&first, now);
    changed.status = Some(NormalizedStatus::Granted);
    store.update(&changed, now).unwrap();

    let items = store.load_all().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[&first.code].status, Some(NormalizedStatus::Granted));
    assert_eq!(items[&second.code].status, None);
    assert_eq!(store.write_count().unwrap(), 3);
}
