// crates/visa-monitor-runtime/src/cycle.rs
// ============================================================================
// Module: Cycle Pipeline
// Description: One scheduling pass from due computation to persistence.
// Purpose: Tie the scheduler, dispatcher, tracker, store, and notifier together.
// Dependencies: crate::{clock, dispatcher}, visa-monitor-{config,core,notify,store}
// ============================================================================

//! ## Overview
//! A cycle reconciles the stored snapshots with the current tracked set,
//! computes the due codes, dispatches them, and consumes readings as they
//! complete. Each reading is reconciled through the LKVS tracker and
//! persisted before its notification is queued.
//!
//! ## Invariants
//! - One whole-document atomic write per completed code.
//! - Notification failures never block persistence.
//! - A storage error aborts the cycle; readings already written stay written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use visa_monitor_config::ConfigSnapshot;
use visa_monitor_core::Channel;
use visa_monitor_core::MonitorEvent;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::Timestamp;
use visa_monitor_core::TrackedCode;
use visa_monitor_core::apply_reading;
use visa_monitor_core::due_codes;
use visa_monitor_core::events;
use visa_monitor_core::runtime::scheduler::is_settled;
use visa_monitor_core::runtime::scheduler::next_check_at;
use visa_monitor_notify::Notifier;
use visa_monitor_notify::StatusNotification;
use visa_monitor_store::FailureLog;
use visa_monitor_store::FailureRecord;
use visa_monitor_store::failures::format_day;

use crate::clock::Clock;
use crate::dispatcher::CheckReading;
use crate::dispatcher::ConcurrencyDispatcher;
use crate::dispatcher::DispatchSettings;
use crate::error::RuntimeError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Collaborators shared by every cycle.
pub struct CycleDeps<E: QueryExecutor> {
    /// Portal executor.
    pub executor: Arc<E>,
    /// Snapshot store; written only by the cycle's single consumer loop.
    pub store: Arc<dyn SnapshotStore>,
    /// Notification handle; `None` disables delivery.
    pub notifier: Option<Notifier>,
    /// Event sink.
    pub events: Arc<dyn MonitorEventSink>,
    /// Daily failure export; `None` disables it.
    pub failures: Option<FailureLog>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

impl<E: QueryExecutor> Clone for CycleDeps<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            store: Arc::clone(&self.store),
            notifier: self.notifier.clone(),
            events: Arc::clone(&self.events),
            failures: self.failures.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Codes due at cycle start.
    pub due: usize,
    /// Readings persisted.
    pub processed: usize,
    /// Readings other than `QueryFailed`.
    pub successes: usize,
    /// `QueryFailed` readings.
    pub failures: usize,
    /// Notifications queued.
    pub notifications: usize,
    /// True when cancellation cut the cycle short.
    pub cancelled: bool,
}

/// Cycle result plus the snapshots as persisted at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Counters.
    pub report: CycleReport,
    /// Snapshot map after the cycle.
    pub items: BTreeMap<QueryCode, StatusSnapshot>,
}

// ============================================================================
// SECTION: Cycle
// ============================================================================

/// Runs one cycle against `snapshot`.
///
/// # Errors
///
/// Returns [`RuntimeError::Store`] when state cannot be loaded or written.
pub async fn run_cycle<E>(
    deps: &CycleDeps<E>,
    snapshot: &ConfigSnapshot,
    cancel: watch::Receiver<bool>,
) -> Result<CycleOutcome, RuntimeError>
where
    E: QueryExecutor + 'static,
    E::Context: 'static,
{
    let config = &snapshot.config;
    let started = deps.clock.now();
    let mut items = deps.store.load_all()?;
    if reconcile(&mut items, &snapshot.tracked, config.scheduler.default_freq_minutes, started) {
        deps.store.save_all(&items, started)?;
    }

    let due: Vec<TrackedCode> =
        due_codes(&snapshot.tracked, &items, config.scheduler.default_freq_minutes, started)
            .into_iter()
            .cloned()
            .collect();
    let mut report = CycleReport {
        due: due.len(),
        ..CycleReport::default()
    };
    deps.events.record(
        &MonitorEvent::new(events::CYCLE_STARTED)
            .with("tracked", snapshot.tracked.len())
            .with("due", due.len()),
    );
    if due.is_empty() {
        record_completed(deps.events.as_ref(), &report);
        return Ok(CycleOutcome {
            report,
            items,
        });
    }

    let settings = DispatchSettings::from_config(config);
    let dispatcher = ConcurrencyDispatcher::new(Arc::clone(&deps.executor), settings);
    let (sender, mut receiver) = mpsc::channel::<CheckReading>(due.len());
    let consume = async {
        while let Some(reading) = receiver.recv().await {
            persist_reading(deps, snapshot, &mut items, &mut report, reading)?;
        }
        Ok::<(), RuntimeError>(())
    };
    let (summary, consumed) = tokio::join!(dispatcher.run(due, sender, cancel), consume);
    consumed?;
    report.cancelled = summary.cancelled;
    record_completed(deps.events.as_ref(), &report);
    Ok(CycleOutcome {
        report,
        items,
    })
}

/// Reconciles, persists, and announces one reading.
fn persist_reading<E: QueryExecutor>(
    deps: &CycleDeps<E>,
    snapshot: &ConfigSnapshot,
    items: &mut BTreeMap<QueryCode, StatusSnapshot>,
    report: &mut CycleReport,
    reading: CheckReading,
) -> Result<(), RuntimeError> {
    let Some(tracked) = snapshot.find(&reading.code) else {
        return Ok(());
    };
    let config = &snapshot.config;
    let now = deps.clock.now();
    let prior = items
        .remove(&reading.code)
        .unwrap_or_else(|| StatusSnapshot::pending(tracked, now));
    let outcome = apply_reading(prior, reading.status, now, config.scheduler.tracker_policy());
    let mut updated = outcome.snapshot;
    updated.refresh_display(tracked);
    updated.next_check = scheduled_next(&updated, tracked, config.scheduler.default_freq_minutes);
    let fail_count = updated.consecutive_fail_count;
    items.insert(reading.code.clone(), updated);
    deps.store.save_all(items, now)?;

    report.processed += 1;
    let mut export_error = None;
    if reading.status == NormalizedStatus::QueryFailed {
        report.failures += 1;
        if let Some(log) = &deps.failures {
            let day = now.as_datetime().date();
            let record = FailureRecord {
                date: format_day(day),
                code: reading.code.clone(),
                status: reading.status.label().to_string(),
                remark: reading.error.clone().unwrap_or_default(),
                consecutive_failures: fail_count,
            };
            export_error = log.append(day, &record).err().map(|err| err.to_string());
        }
    } else {
        report.successes += 1;
    }

    let mut notified = false;
    let mut notify_error = None;
    if let (Some(intent), Some(notifier)) = (outcome.notification, &deps.notifier)
        && let Some((Channel::Email, target)) = tracked.notification_target()
    {
        let notification = StatusNotification {
            code: reading.code.clone(),
            target: target.to_string(),
            intent,
            checked_at: now,
        };
        match notifier.notify(&notification) {
            Ok(()) => {
                report.notifications += 1;
                notified = true;
            }
            Err(err) => notify_error = Some(err.kind()),
        }
    }

    let mut event = MonitorEvent::new(events::CODE_CHECKED)
        .with("code", reading.code.as_str())
        .with("status", reading.status.label())
        .with("attempts", reading.attempts)
        .with("consecutive_failures", fail_count)
        .with("notified", notified);
    if let Some(error) = reading.error {
        event = event.with("error", error);
    }
    if let Some(kind) = notify_error {
        event = event.with("notify_error", kind);
    }
    if let Some(error) = export_error {
        event = event.with("failure_export_error", error);
    }
    deps.events.record(&event);
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Aligns stored snapshots with `tracked`. Returns true when anything changed.
///
/// New codes get a pending entry, dropped codes are removed, and display
/// fields follow the current declaration.
pub fn reconcile(
    items: &mut BTreeMap<QueryCode, StatusSnapshot>,
    tracked: &[TrackedCode],
    default_freq_minutes: u32,
    now: Timestamp,
) -> bool {
    let wanted: BTreeSet<&QueryCode> = tracked.iter().map(|code| &code.code).collect();
    let before = items.len();
    items.retain(|code, _| wanted.contains(code));
    let mut changed = items.len() != before;
    for code in tracked {
        match items.get_mut(&code.code) {
            Some(existing) => {
                let original = existing.clone();
                existing.refresh_display(code);
                existing.next_check = scheduled_next(existing, code, default_freq_minutes);
                changed |= *existing != original;
            }
            None => {
                items.insert(code.code.clone(), StatusSnapshot::pending(code, now));
                changed = true;
            }
        }
    }
    changed
}

/// Returns the next-check time shown on status surfaces.
fn scheduled_next(
    snapshot: &StatusSnapshot,
    tracked: &TrackedCode,
    default_freq_minutes: u32,
) -> Option<Timestamp> {
    if is_settled(Some(snapshot)) {
        return None;
    }
    next_check_at(snapshot, tracked.effective_freq(default_freq_minutes))
}

/// Emits the completion event.
fn record_completed(sink: &dyn MonitorEventSink, report: &CycleReport) {
    sink.record(
        &MonitorEvent::new(events::CYCLE_COMPLETED)
            .with("due", report.due)
            .with("processed", report.processed)
            .with("successes", report.successes)
            .with("failures", report.failures)
            .with("notifications", report.notifications)
            .with("cancelled", report.cancelled),
    );
}
