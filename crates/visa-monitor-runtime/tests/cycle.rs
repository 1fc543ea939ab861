// crates/visa-monitor-runtime/tests/cycle.rs
// ============================================================================
// Module: Cycle Pipeline Tests
// Description: Multi-cycle scenarios against file-backed state.
// Purpose: Verify persistence, LKVS deduplication, and failure exports.
// Dependencies: visa-monitor-runtime, visa-monitor-store, tempfile, tokio
// ============================================================================

//! ## Overview
//! Runs whole cycles with a scripted portal, a manual clock, and a recording
//! mail relay, then inspects `status.json`, the failure export, and the
//! delivered emails.

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

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::CodeSpec;
use common::GRANTED_TEXT;
use common::PROCEEDINGS_TEXT;
use common::RecordingTransport;
use common::ScriptedExecutor;
use common::Step;
use common::monitor_config;
use common::notifier_settings;
use common::start_time;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::sleep;
use visa_monitor_config::ConfigSnapshot;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::TrackedCode;
use visa_monitor_core::events::CODE_CHECKED;
use visa_monitor_core::events::CYCLE_COMPLETED;
use visa_monitor_core::events::MemoryEventSink;
use visa_monitor_notify::Notifier;
use visa_monitor_runtime::CycleDeps;
use visa_monitor_runtime::ManualClock;
use visa_monitor_runtime::cycle::reconcile;
use visa_monitor_runtime::run_cycle;
use visa_monitor_store::FailureLog;
use visa_monitor_store::FileStatusStore;

const CODE: &str = "PEKI202506020001";
const OTHER: &str = "PEKI202506020002";

struct Harness {
    _dir: TempDir,
    deps: CycleDeps<ScriptedExecutor>,
    executor: Arc<ScriptedExecutor>,
    store: Arc<FileStatusStore>,
    clock: Arc<ManualClock>,
    events: Arc<MemoryEventSink>,
    transport: Arc<RecordingTransport>,
    failures: FailureLog,
    snapshot: ConfigSnapshot,
}

fn harness(codes: &[CodeSpec<'_>]) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = monitor_config(dir.path(), codes);
    let store = Arc::new(FileStatusStore::new(&config.storage.status_path()).unwrap());
    let executor = Arc::new(ScriptedExecutor::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let events = Arc::new(MemoryEventSink::default());
    let transport = Arc::new(RecordingTransport::default());
    let (notifier, _worker) = Notifier::spawn(transport.clone(), notifier_settings(), events.clone());
    let failures = FailureLog::new(config.storage.fails_dir());
    let deps = CycleDeps {
        executor: Arc::clone(&executor),
        store: store.clone(),
        notifier: Some(notifier),
        events: events.clone(),
        failures: Some(failures.clone()),
        clock: clock.clone(),
    };
    let snapshot = ConfigSnapshot::from_config(config, Vec::new()).unwrap();
    Harness {
        _dir: dir,
        deps,
        executor,
        store,
        clock,
        events,
        transport,
        failures,
        snapshot,
    }
}

/// A flag whose sender is gone never resolves as cancelled.
fn never_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

#[tokio::test(start_paused = true)]
async fn three_cycles_notify_first_status_and_one_transition() {
    let h = harness(&[CodeSpec::email(CODE, "applicant@example.com")]);
    h.executor.script(
        CODE,
        vec![
            Step::text(PROCEEDINGS_TEXT),
            Step::fail("connection reset"),
            Step::text(GRANTED_TEXT),
        ],
    );
    let code = QueryCode::new(CODE);

    let first = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    assert_eq!(first.report.processed, 1);
    assert_eq!(first.report.notifications, 1);
    assert_eq!(first.items[&code].status, Some(NormalizedStatus::Proceedings));

    h.clock.advance_minutes(60);
    let second = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    let failed = &second.items[&code];
    assert_eq!(failed.status, Some(NormalizedStatus::QueryFailed));
    assert_eq!(failed.last_known_valid_status, Some(NormalizedStatus::Proceedings));
    assert_eq!(failed.consecutive_fail_count, 1);
    assert_eq!(second.report.notifications, 0);

    h.clock.advance_minutes(1);
    let third = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    let granted = &third.items[&code];
    assert_eq!(granted.status, Some(NormalizedStatus::Granted));
    assert_eq!(granted.consecutive_fail_count, 0);
    assert_eq!(granted.next_check, None);
    assert_eq!(third.report.notifications, 1);

    sleep(Duration::from_secs(5)).await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].subject.starts_with("[Proceedings / 审理中]"));
    assert!(sent[1].subject.starts_with("[Granted / 已通过]"));
    assert!(sent[1].html_body.contains("Proceedings / 审理中"));
    assert!(sent.iter().all(|email| email.to == "applicant@example.com"));

    let persisted = h.store.load_all().unwrap();
    assert_eq!(persisted, third.items);
    assert_eq!(h.events.named(CODE_CHECKED).len(), 3);
    assert_eq!(h.events.named(CYCLE_COMPLETED).len(), 3);

    h.clock.advance_minutes(24 * 60);
    let settled = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    assert_eq!(settled.report.due, 0);
    assert_eq!(h.executor.submissions().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn failure_export_counts_consecutive_failures() {
    let h = harness(&[CodeSpec::silent(CODE)]);
    h.executor.fallback(Step::fail("portal timeout"));

    run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    h.clock.advance_minutes(1);
    run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();

    let day = start_time().as_datetime().date();
    let export = std::fs::read_to_string(h.failures.path_for(day)).unwrap();
    let lines: Vec<&str> = export.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("日期/Date,查询码/Code"));
    assert!(lines[1].contains(CODE));
    assert!(lines[1].contains("portal timeout"));
    assert!(lines[1].ends_with(",1"));
    assert!(lines[2].ends_with(",2"));
    let checked = h.events.named(CODE_CHECKED);
    assert_eq!(checked[1].field("consecutive_failures"), Some(&serde_json::json!(2)));
}

#[tokio::test(start_paused = true)]
async fn codes_without_channel_are_checked_but_never_notified() {
    let h = harness(&[CodeSpec::silent(CODE), CodeSpec::email(OTHER, "b@example.com")]);
    let outcome = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    assert_eq!(outcome.report.processed, 2);
    assert_eq!(outcome.report.notifications, 1);

    sleep(Duration::from_secs(1)).await;
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains(OTHER));
}

#[tokio::test(start_paused = true)]
async fn rejected_notification_is_reported_with_its_kind() {
    let mut h = harness(&[CodeSpec::email(CODE, "applicant@example.com")]);
    let (notifier, worker) =
        Notifier::spawn(h.transport.clone(), notifier_settings(), h.events.clone());
    worker.abort();
    let _ = worker.await;
    h.deps.notifier = Some(notifier);

    let outcome = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await.unwrap();
    assert_eq!(outcome.report.processed, 1);
    assert_eq!(outcome.report.notifications, 0);
    let checked = h.events.named(CODE_CHECKED);
    assert_eq!(checked[0].field("notified"), Some(&serde_json::json!(false)));
    assert_eq!(checked[0].field("notify_error"), Some(&serde_json::json!("queue_closed")));
    let stored = h.store.load_all().unwrap();
    assert_eq!(stored[&QueryCode::new(CODE)].status, Some(NormalizedStatus::Proceedings));
}

#[tokio::test(start_paused = true)]
async fn storage_failure_aborts_the_cycle() {
    let h = harness(&[CodeSpec::silent(CODE)]);
    let status_path = h.store.path();
    std::fs::create_dir_all(status_path.parent().unwrap()).unwrap();
    std::fs::write(&status_path, b"{not json").unwrap();

    let result = run_cycle(&h.deps, &h.snapshot, never_cancelled()).await;
    assert!(result.is_err());
    assert!(h.executor.submissions().is_empty());
}

#[test]
fn reconcile_adds_pending_entries_and_drops_removed_codes() {
    let now = start_time();
    let kept = TrackedCode::email(QueryCode::new(CODE), "a@example.com");
    let mut items = BTreeMap::new();
    let mut stale = StatusSnapshot::pending(&kept, now);
    stale.code = QueryCode::new("PEKI202506029999");
    items.insert(stale.code.clone(), stale);
    let mut existing = StatusSnapshot::pending(&kept, now);
    existing.target = Some("old@example.com".to_string());
    items.insert(existing.code.clone(), existing);

    let added = TrackedCode::email(QueryCode::new(OTHER), "b@example.com");
    let changed = reconcile(&mut items, &[kept, added], 60, now);

    assert!(changed);
    assert_eq!(items.len(), 2);
    assert_eq!(items[&QueryCode::new(CODE)].target.as_deref(), Some("a@example.com"));
    assert_eq!(items[&QueryCode::new(OTHER)].status, None);

    let tracked = [
        TrackedCode::email(QueryCode::new(CODE), "a@example.com"),
        TrackedCode::email(QueryCode::new(OTHER), "b@example.com"),
    ];
    assert!(!reconcile(&mut items, &tracked, 60, now));
}
