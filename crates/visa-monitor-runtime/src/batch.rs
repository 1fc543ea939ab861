// crates/visa-monitor-runtime/src/batch.rs
// ============================================================================
// Module: Batch Checker
// Description: One-shot check of every unanswered row in an operator CSV.
// Purpose: Fill the status column through the same dispatcher as the daemon.
// Dependencies: crate::{clock, dispatcher}, visa-monitor-{config,core,store}
// ============================================================================

//! ## Overview
//! Rows whose status cell is empty are checked; rows sharing a code are
//! checked once and all receive the reading. The CSV is rewritten after
//! every reading so an interrupted run keeps its progress. Failed lookups
//! are appended to the daily failure export with a cross-run counter kept
//! in `counters.json` next to it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use visa_monitor_config::MonitorConfig;
use visa_monitor_core::CodeOrigin;
use visa_monitor_core::MonitorEvent;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::QueryType;
use visa_monitor_core::StoreError;
use visa_monitor_core::TrackedCode;
use visa_monitor_core::events;
use visa_monitor_store::AtomicFile;
use visa_monitor_store::CountersStore;
use visa_monitor_store::CsvTable;
use visa_monitor_store::FailureCounters;
use visa_monitor_store::FailureLog;
use visa_monitor_store::FailureRecord;
use visa_monitor_store::failures::format_day;

use crate::clock::Clock;
use crate::dispatcher::CheckReading;
use crate::dispatcher::ConcurrencyDispatcher;
use crate::dispatcher::DispatchSettings;
use crate::error::RuntimeError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header candidates for the code column.
pub const CODE_COLUMNS: [&str; 3] = ["查询码/Code", "查询码", "code"];
/// Header candidates for the date column.
pub const DATE_COLUMNS: [&str; 3] = ["日期/Date", "日期", "date"];
/// Header of the status column, appended when missing.
pub const STATUS_COLUMN: &str = "签证状态/Status";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Per-run overrides of the configured dispatcher limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSettings {
    /// Concurrent submissions.
    pub workers: Option<usize>,
    /// Attempts per code.
    pub retries: Option<u32>,
}

impl BatchSettings {
    /// Applies the overrides to the configured dispatcher settings.
    #[must_use]
    pub fn dispatch(&self, config: &MonitorConfig) -> DispatchSettings {
        let mut settings = DispatchSettings::from_config(config);
        if let Some(workers) = self.workers {
            settings.workers = workers.max(1);
            settings.nav_cap = settings.nav_cap.min(settings.workers);
        }
        if let Some(retries) = self.retries {
            settings.retry.max_attempts = retries.max(1);
        }
        settings
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Data rows in the file.
    pub rows: usize,
    /// Rows skipped because they already had a status or no code.
    pub skipped: usize,
    /// Distinct codes checked.
    pub checked: usize,
    /// Rows written with a reading.
    pub written: usize,
    /// Codes that ended as `QueryFailed`.
    pub failures: usize,
    /// Reading count per status.
    pub by_status: BTreeMap<NormalizedStatus, usize>,
    /// Failure export written to, if any.
    pub fails_path: Option<PathBuf>,
    /// True when cancellation cut the run short.
    pub cancelled: bool,
}

/// Collaborators for a batch run.
pub struct BatchRunner<E: QueryExecutor> {
    /// Portal executor.
    executor: Arc<E>,
    /// Event sink.
    events: Arc<dyn MonitorEventSink>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Daily failure export.
    failures: FailureLog,
    /// Cross-run failure counters.
    counters: CountersStore,
}

/// Column layout of the input file.
struct Columns {
    /// Code column.
    code: usize,
    /// Status column.
    status: usize,
    /// Optional date column.
    date: Option<usize>,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

impl<E> BatchRunner<E>
where
    E: QueryExecutor + 'static,
    E::Context: 'static,
{
    /// Creates a runner writing failures under `fails_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Store`] when the counters path is unusable.
    pub fn new(
        executor: Arc<E>,
        fails_dir: &Path,
        events: Arc<dyn MonitorEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        Ok(Self {
            executor,
            events,
            clock,
            failures: FailureLog::new(fails_dir),
            counters: CountersStore::in_dir(fails_dir)?,
        })
    }

    /// Checks every unanswered row of `csv_path` and rewrites the file.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Store`] when the CSV is missing, empty, has no
    /// code column, or cannot be rewritten.
    pub async fn run(
        &self,
        csv_path: &Path,
        settings: DispatchSettings,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchReport, RuntimeError> {
        let text = tokio::fs::read_to_string(csv_path).await.map_err(|err| {
            RuntimeError::Store(format!("cannot read {}: {err}", csv_path.display()))
        })?;
        let mut table = CsvTable::parse(&text);
        if table.headers.is_empty() {
            return Err(RuntimeError::Store(format!("{} is empty", csv_path.display())));
        }
        let columns = resolve_columns(&mut table).ok_or_else(|| {
            RuntimeError::Store(format!(
                "no code column ({}) in {}",
                CODE_COLUMNS[0],
                csv_path.display()
            ))
        })?;
        let file = AtomicFile::new(csv_path)?;
        let pending = pending_rows(&table, &columns);
        let mut report = BatchReport {
            rows: table.rows.len(),
            skipped: table.rows.len() - pending.values().map(Vec::len).sum::<usize>(),
            checked: pending.len(),
            ..BatchReport::default()
        };
        if pending.is_empty() {
            self.record_completed(csv_path, &report);
            return Ok(report);
        }

        let mut counters = self.counters.load()?;
        let codes: Vec<TrackedCode> = pending.keys().map(|code| batch_code(code.clone())).collect();
        let dispatcher = ConcurrencyDispatcher::new(Arc::clone(&self.executor), settings);
        let (sender, mut receiver) = mpsc::channel::<CheckReading>(codes.len());
        let consume = async {
            while let Some(reading) = receiver.recv().await {
                let Some(rows) = pending.get(&reading.code) else {
                    continue;
                };
                for &row in rows {
                    if let Some(cell) =
                        table.rows.get_mut(row).and_then(|cells| cells.get_mut(columns.status))
                    {
                        *cell = reading.status.label().to_string();
                        report.written += 1;
                    }
                }
                file.replace(table.to_csv_string().as_bytes())?;
                *report.by_status.entry(reading.status).or_insert(0) += 1;
                let date = columns
                    .date
                    .zip(rows.first())
                    .and_then(|(column, row)| table.rows.get(*row)?.get(column))
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty());
                self.record_reading(&reading, date, &mut counters, &mut report)?;
            }
            Ok::<(), StoreError>(())
        };
        let (summary, consumed) = tokio::join!(dispatcher.run(codes, sender, cancel), consume);
        consumed?;
        report.cancelled = summary.cancelled;
        self.record_completed(csv_path, &report);
        Ok(report)
    }

    /// Updates counters and the failure export for one reading.
    fn record_reading(
        &self,
        reading: &CheckReading,
        date: Option<String>,
        counters: &mut FailureCounters,
        report: &mut BatchReport,
    ) -> Result<(), StoreError> {
        let mut event = MonitorEvent::new(events::BATCH_ROW_CHECKED)
            .with("code", reading.code.as_str())
            .with("status", reading.status.label())
            .with("attempts", reading.attempts);
        if reading.status == NormalizedStatus::QueryFailed {
            report.failures += 1;
            let consecutive = counters.record_failure(&reading.code);
            self.counters.save(counters)?;
            let today = self.clock.now().as_datetime().date();
            let record = FailureRecord {
                date: date.unwrap_or_else(|| format_day(today)),
                code: reading.code.clone(),
                status: reading.status.label().to_string(),
                remark: reading.error.clone().unwrap_or_default(),
                consecutive_failures: consecutive,
            };
            match self.failures.append(today, &record) {
                Ok(path) => report.fails_path = Some(path),
                Err(err) => event = event.with("failure_export_error", err.to_string()),
            }
            event = event.with("consecutive_failures", consecutive);
        } else if counters.get(&reading.code) > 0 {
            counters.record_success(&reading.code);
            self.counters.save(counters)?;
        }
        if let Some(error) = &reading.error {
            event = event.with("error", error.as_str());
        }
        self.events.record(&event);
        Ok(())
    }

    /// Emits the completion event.
    fn record_completed(&self, csv_path: &Path, report: &BatchReport) {
        self.events.record(
            &MonitorEvent::new(events::BATCH_COMPLETED)
                .with("path", csv_path.display().to_string())
                .with("rows", report.rows)
                .with("skipped", report.skipped)
                .with("checked", report.checked)
                .with("failures", report.failures)
                .with("cancelled", report.cancelled),
        );
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Locates the columns, appending the status column when missing.
fn resolve_columns(table: &mut CsvTable) -> Option<Columns> {
    let code = table.find_column(&CODE_COLUMNS)?;
    let status = match table.find_column(&[STATUS_COLUMN]) {
        Some(index) => index,
        None => table.add_column(STATUS_COLUMN),
    };
    Some(Columns {
        code,
        status,
        date: table.find_column(&DATE_COLUMNS),
    })
}

/// Groups unanswered rows by code.
fn pending_rows(table: &CsvTable, columns: &Columns) -> BTreeMap<QueryCode, Vec<usize>> {
    let mut pending: BTreeMap<QueryCode, Vec<usize>> = BTreeMap::new();
    for (index, row) in table.rows.iter().enumerate() {
        let code = row.get(columns.code).map_or("", |value| value.trim());
        let answered = row.get(columns.status).is_some_and(|value| !value.trim().is_empty());
        if code.is_empty() || answered {
            continue;
        }
        pending.entry(QueryCode::new(code)).or_default().push(index);
    }
    pending
}

/// Wraps a batch code for the dispatcher; batch rows never notify.
fn batch_code(code: QueryCode) -> TrackedCode {
    TrackedCode {
        code,
        channel: None,
        target: None,
        freq_minutes: None,
        note: None,
        query_type: QueryType::default(),
        origin: CodeOrigin::Config,
    }
}
