// crates/visa-monitor-runtime/tests/monitor.rs
// ============================================================================
// Module: Monitor Loop Tests
// Description: Hot reload, user-code refresh, and shutdown of the daemon loop.
// Purpose: Ensure snapshots swap only on valid input and the loop stops cleanly.
// Dependencies: visa-monitor-runtime, visa-monitor-store, tempfile, tokio
// ============================================================================

//! ## Overview
//! Builds a [`Monitor`] over a config file in a temp directory and drives it
//! through reloads and control messages.

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

use std::sync::Arc;
use std::time::Duration;

use common::CodeSpec;
use common::RecordingTransport;
use common::ScriptedExecutor;
use common::config_toml;
use common::notifier_settings;
use common::start_time;
use common::write_config;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::sleep;
use visa_monitor_core::QueryCode;
use visa_monitor_core::events::CONFIG_DIFF;
use visa_monitor_core::events::CONFIG_RELOAD_REJECTED;
use visa_monitor_core::events::CONFIG_RELOADED;
use visa_monitor_core::events::CONFIG_RESTART_REQUIRED;
use visa_monitor_core::events::CYCLE_COMPLETED;
use visa_monitor_core::events::MONITOR_STARTED;
use visa_monitor_core::events::MemoryEventSink;
use visa_monitor_notify::Notifier;
use visa_monitor_runtime::ControlMessage;
use visa_monitor_runtime::CycleDeps;
use visa_monitor_runtime::ManualClock;
use visa_monitor_runtime::Monitor;
use visa_monitor_runtime::load_state;
use visa_monitor_store::UsersDocument;
use visa_monitor_store::UsersStore;

const FIRST: &str = "PEKI202506020001";
const SECOND: &str = "PEKI202506020002";

struct Fixture {
    dir: TempDir,
    monitor: Monitor<ScriptedExecutor>,
    events: Arc<MemoryEventSink>,
    executor: Arc<ScriptedExecutor>,
}

fn fixture(codes: &[CodeSpec<'_>]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let path = write_config(dir.path(), codes);
    let events = Arc::new(MemoryEventSink::default());
    let state = load_state(Some(path.as_path()), events.as_ref()).unwrap();
    let executor = Arc::new(ScriptedExecutor::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let deps = CycleDeps {
        executor: Arc::clone(&executor),
        store: state.stores.status.clone(),
        notifier: None,
        events: events.clone(),
        failures: None,
        clock,
    };
    let monitor = Monitor::new(deps, state.snapshot, Some(path), state.stores.users);
    Fixture {
        dir,
        monitor,
        events,
        executor,
    }
}

#[test]
fn invalid_reload_keeps_previous_snapshot() {
    let mut f = fixture(&[CodeSpec::silent(FIRST)]);
    std::fs::write(f.dir.path().join("config.toml"), "[scheduler]\nworkers = 0\n").unwrap();

    f.monitor.reload();

    let rejected = f.events.named(CONFIG_RELOAD_REJECTED);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].field("kept_tracked"), Some(&json!(1)));
    assert_eq!(f.monitor.current().tracked.len(), 1);
    assert!(f.events.named(CONFIG_RELOADED).is_empty());
}

#[test]
fn valid_reload_swaps_snapshot_and_reports_diff() {
    let mut f = fixture(&[CodeSpec::silent(FIRST)]);
    let handle = f.monitor.handle();
    write_config(
        f.dir.path(),
        &[CodeSpec::email(FIRST, "a@example.com"), CodeSpec::silent(SECOND)],
    );

    f.monitor.reload();

    assert_eq!(f.events.named(CONFIG_RELOADED).len(), 1);
    let diff = f.events.named(CONFIG_DIFF);
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].field("added"), Some(&json!([SECOND])));
    let modified = diff[0].field("modified").unwrap().to_string();
    assert!(modified.contains(FIRST));
    assert!(modified.contains("channel"));
    assert_eq!(handle.current().tracked.len(), 2);
}

#[tokio::test]
async fn reload_reconfigures_notifier_and_flags_fixed_settings() {
    let f = fixture(&[CodeSpec::silent(FIRST)]);
    let (notifier, _worker) = Notifier::spawn(
        Arc::new(RecordingTransport::default()),
        notifier_settings(),
        f.events.clone(),
    );
    let mut monitor = f.monitor.with_reconfigure(Arc::new(notifier.clone()));
    let moved = f.dir.path().join("elsewhere");
    let toml = config_toml(f.dir.path(), &[CodeSpec::silent(FIRST)]).replace(
        &f.dir.path().join("site").display().to_string(),
        &moved.display().to_string(),
    );
    std::fs::write(
        f.dir.path().join("config.toml"),
        format!("{toml}[notify]\nemail_max_per_minute = 42\n"),
    )
    .unwrap();

    monitor.reload();

    assert_eq!(notifier.settings().max_per_minute, 42);
    let reloaded = f.events.named(CONFIG_RELOADED);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0].field("reconfigured"), Some(&json!(["notifier"])));
    let restart = f.events.named(CONFIG_RESTART_REQUIRED);
    assert_eq!(restart.len(), 1);
    assert_eq!(restart[0].field("fields"), Some(&json!(["storage.site_dir"])));
}

#[tokio::test]
async fn unchanged_reload_leaves_targets_alone() {
    let f = fixture(&[CodeSpec::silent(FIRST)]);
    let (notifier, _worker) = Notifier::spawn(
        Arc::new(RecordingTransport::default()),
        notifier_settings(),
        f.events.clone(),
    );
    let before = notifier.settings().max_per_minute;
    let mut monitor = f.monitor.with_reconfigure(Arc::new(notifier.clone()));

    monitor.reload();

    assert_eq!(notifier.settings().max_per_minute, before);
    let reloaded = f.events.named(CONFIG_RELOADED);
    assert_eq!(reloaded[0].field("reconfigured"), Some(&json!([])));
    assert!(f.events.named(CONFIG_RESTART_REQUIRED).is_empty());
}

#[test]
fn refresh_merges_verified_user_codes() {
    let mut f = fixture(&[CodeSpec::silent(FIRST)]);
    let users = UsersStore::new(
        &f.dir.path().join("site").join("config").join("users.json"),
    )
    .unwrap();
    let now = start_time();
    let mut document = UsersDocument::default();
    document
        .begin_addition("token".to_string(), QueryCode::new(SECOND), "user@example.com", now)
        .unwrap();
    document.complete_addition("token", now).unwrap();
    users.save(&mut document, now).unwrap();

    f.monitor.refresh_users();

    let current = f.monitor.current();
    assert_eq!(current.tracked.len(), 2);
    assert!(current.find(&QueryCode::new(SECOND)).is_some());
}

#[tokio::test(start_paused = true)]
async fn loop_runs_cycles_until_shutdown() {
    let f = fixture(&[CodeSpec::silent(FIRST)]);
    let handle = f.monitor.handle();
    let events = Arc::clone(&f.events);
    let executor = Arc::clone(&f.executor);
    let running = tokio::spawn(f.monitor.run());

    sleep(Duration::from_secs(1)).await;
    assert!(handle.send(ControlMessage::CheckNow).await);
    sleep(Duration::from_secs(1)).await;
    handle.request_shutdown();

    running.await.unwrap().unwrap();
    assert_eq!(events.named(MONITOR_STARTED).len(), 1);
    assert!(events.named(CYCLE_COMPLETED).len() >= 2);
    assert_eq!(executor.submissions().len(), 1);
}
