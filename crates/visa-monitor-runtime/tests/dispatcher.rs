// crates/visa-monitor-runtime/tests/dispatcher.rs
// ============================================================================
// Module: Concurrency Dispatcher Tests
// Description: Gate limits, retries, context lifecycle, and cancellation.
// Purpose: Ensure fan-out stays bounded and always releases its context.
// Dependencies: visa-monitor-runtime, tokio
// ============================================================================

//! ## Overview
//! Drives [`ConcurrencyDispatcher`] with a scripted executor under tokio's
//! paused clock and collects the readings it sends.

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
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::GRANTED_TEXT;
use common::ScriptedExecutor;
use common::Step;
use common::fast_dispatch;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::TrackedCode;
use visa_monitor_runtime::CheckReading;
use visa_monitor_runtime::ConcurrencyDispatcher;
use visa_monitor_runtime::DispatchSettings;
use visa_monitor_runtime::DispatchSummary;

fn codes(count: u32) -> Vec<TrackedCode> {
    (1 ..= count)
        .map(|seq| TrackedCode::email(QueryCode::new(format!("PEKI20250602{seq:04}")), "a@example.com"))
        .collect()
}

async fn dispatch(
    executor: Arc<ScriptedExecutor>,
    settings: DispatchSettings,
    codes: Vec<TrackedCode>,
    cancel: watch::Receiver<bool>,
) -> (DispatchSummary, Vec<CheckReading>) {
    let dispatcher = ConcurrencyDispatcher::new(executor, settings);
    let (sender, mut receiver) = mpsc::channel(codes.len().max(1));
    let summary = dispatcher.run(codes, sender, cancel).await;
    let mut readings = Vec::new();
    while let Some(reading) = receiver.recv().await {
        readings.push(reading);
    }
    (summary, readings)
}

#[tokio::test(start_paused = true)]
async fn navigation_and_submission_caps_hold() {
    let executor =
        Arc::new(ScriptedExecutor::with_delays(Duration::from_millis(20), Duration::from_millis(50)));
    let (summary, readings) =
        dispatch(Arc::clone(&executor), fast_dispatch(3, 1, 1), codes(8), watch::channel(false).1)
            .await;

    assert_eq!(summary.dispatched, 8);
    assert!(!summary.cancelled);
    assert_eq!(readings.len(), 8);
    assert!(readings.iter().all(|reading| reading.status == NormalizedStatus::Proceedings));
    assert_eq!(executor.nav_peak.load(Ordering::SeqCst), 1);
    assert!(executor.fill_peak.load(Ordering::SeqCst) <= 3);
    assert!(executor.fill_peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn one_context_per_run_is_opened_and_closed() {
    let executor = Arc::new(ScriptedExecutor::new());
    dispatch(Arc::clone(&executor), fast_dispatch(2, 2, 1), codes(3), watch::channel(false).1)
        .await;
    assert_eq!(executor.opened.load(Ordering::SeqCst), 1);
    assert_eq!(executor.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_within_budget() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.script(
        "PEKI202506020001",
        vec![Step::fail("reset"), Step::fail("reset"), Step::text(GRANTED_TEXT)],
    );
    let (_, readings) =
        dispatch(Arc::clone(&executor), fast_dispatch(1, 1, 3), codes(1), watch::channel(false).1)
            .await;

    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].status, NormalizedStatus::Granted);
    assert_eq!(readings[0].attempts, 3);
    assert_eq!(readings[0].raw.as_deref(), Some(GRANTED_TEXT));
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_yields_query_failed() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.fallback(Step::fail("timeout"));
    let (_, readings) =
        dispatch(Arc::clone(&executor), fast_dispatch(1, 1, 2), codes(1), watch::channel(false).1)
            .await;

    assert_eq!(readings[0].status, NormalizedStatus::QueryFailed);
    assert_eq!(readings[0].attempts, 2);
    assert!(readings[0].error.as_deref().unwrap().contains("timeout"));
    assert_eq!(executor.submissions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unopenable_context_fails_every_code() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.fail_open("browser missing");
    let (summary, readings) =
        dispatch(Arc::clone(&executor), fast_dispatch(2, 2, 3), codes(3), watch::channel(false).1)
            .await;

    assert_eq!(summary.dispatched, 0);
    assert_eq!(readings.len(), 3);
    assert!(readings.iter().all(|reading| reading.status == NormalizedStatus::QueryFailed));
    assert!(readings.iter().all(|reading| reading.attempts == 0));
    assert_eq!(executor.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_keeps_finished_readings_and_closes_context() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.script("PEKI202506020002", vec![Step::Hang]);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        cancel_tx.send_replace(true);
        sleep(Duration::from_secs(60)).await;
    });

    let (summary, readings) =
        dispatch(Arc::clone(&executor), fast_dispatch(2, 2, 1), codes(2), cancel_rx).await;

    assert!(summary.cancelled);
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].code.as_str(), "PEKI202506020001");
    assert_eq!(executor.closed.load(Ordering::SeqCst), 1);
}
