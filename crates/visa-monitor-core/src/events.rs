// crates/visa-monitor-core/src/events.rs
// ============================================================================
// Module: Monitor Events
// Description: Structured JSON-line events and pluggable sinks.
// Purpose: Emit operational logs without binding to a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every noteworthy runtime step becomes a [`MonitorEvent`]: a stable event
//! name, a millisecond timestamp, and a flat JSON object of details. Sinks
//! write one JSON object per line so deployments can route them to any log
//! pipeline. Event names are part of the operational contract.
//!
//! [`FileEventSink`] keeps one file per UTC day, chosen from each event's
//! own timestamp, so a long-running daemon rolls over at midnight.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::Date;

use crate::core::Timestamp;

// ============================================================================
// SECTION: Event Names
// ============================================================================

/// Daemon started.
pub const MONITOR_STARTED: &str = "monitor_started";
/// New configuration snapshot installed.
pub const CONFIG_RELOADED: &str = "config_reloaded";
/// Reload refused; previous snapshot kept.
pub const CONFIG_RELOAD_REJECTED: &str = "config_reload_rejected";
/// Reload applied, but some changed settings wait for a restart.
pub const CONFIG_RESTART_REQUIRED: &str = "config_restart_required";
/// Tracked set changed between cycles.
pub const CONFIG_DIFF: &str = "config_diff";
/// Cycle began.
pub const CYCLE_STARTED: &str = "cycle_started";
/// Cycle finished.
pub const CYCLE_COMPLETED: &str = "cycle_completed";
/// One code was checked and persisted.
pub const CODE_CHECKED: &str = "code_checked";
/// Email delivered.
pub const NOTIFICATION_SENT: &str = "notification_sent";
/// Email delivery gave up or could not be queued.
pub const NOTIFICATION_FAILED: &str = "notification_failed";
/// A state file was restored from its backup copy.
pub const STORE_RECOVERED_FROM_BACKUP: &str = "store_recovered_from_backup";
/// Shutdown signal received.
pub const SHUTDOWN_REQUESTED: &str = "shutdown_requested";
/// One batch CSV row was checked and written.
pub const BATCH_ROW_CHECKED: &str = "batch_row_checked";
/// Batch run finished.
pub const BATCH_COMPLETED: &str = "batch_completed";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Structured monitor event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event details.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MonitorEvent {
    /// Creates an event with the current timestamp and no details.
    #[must_use]
    pub fn new(event: &'static str) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            fields: Map::new(),
        }
    }

    /// Adds a detail field.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Returns a detail field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for monitor events.
pub trait MonitorEventSink: Send + Sync {
    /// Record an event.
    fn record(&self, event: &MonitorEvent);
}

/// Sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl MonitorEventSink for StderrEventSink {
    fn record(&self, event: &MonitorEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Sink that appends JSON lines to `{dir}/{prefix}_{YYYY-MM-DD}.jsonl`.
pub struct FileEventSink {
    /// Log directory.
    dir: PathBuf,
    /// File name prefix.
    prefix: String,
    /// File for the most recent event day.
    current: Mutex<Option<DailyFile>>,
}

/// Open log file and the UTC day it covers.
struct DailyFile {
    /// Covered day.
    date: Date,
    /// Append handle.
    file: File,
}

impl FileEventSink {
    /// Creates `dir` and opens today's file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn daily(dir: &Path, prefix: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let sink = Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            current: Mutex::new(None),
        };
        let date = Timestamp::now_utc().as_datetime().date();
        let file = sink.open(date)?;
        if let Ok(mut current) = sink.current.lock() {
            *current = Some(DailyFile {
                date,
                file,
            });
        }
        Ok(sink)
    }

    /// Returns the file that holds events of `date`.
    #[must_use]
    pub fn path_for(&self, date: Date) -> PathBuf {
        self.dir.join(format!("{}_{date}.jsonl", self.prefix))
    }

    /// Opens the file for `date` in append mode.
    fn open(&self, date: Date) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(self.path_for(date))
    }
}

impl MonitorEventSink for FileEventSink {
    fn record(&self, event: &MonitorEvent) {
        let Ok(payload) = serde_json::to_string(event) else {
            return;
        };
        let date = event_date(event);
        let Ok(mut current) = self.current.lock() else {
            return;
        };
        if current.as_ref().is_none_or(|open| open.date != date)
            && let Ok(file) = self.open(date)
        {
            *current = Some(DailyFile {
                date,
                file,
            });
        }
        if let Some(open) = current.as_mut() {
            let _ = writeln!(open.file, "{payload}");
            let _ = open.file.flush();
        }
    }
}

/// Returns the UTC day of `event`.
fn event_date(event: &MonitorEvent) -> Date {
    i64::try_from(event.timestamp_ms)
        .ok()
        .and_then(Timestamp::from_unix_millis)
        .unwrap_or_else(Timestamp::now_utc)
        .as_datetime()
        .date()
}

/// No-op sink.
pub struct NoopEventSink;

impl MonitorEventSink for NoopEventSink {
    fn record(&self, _event: &MonitorEvent) {}
}

/// Sink that forwards every event to several sinks.
pub struct FanoutEventSink {
    /// Downstream sinks.
    sinks: Vec<Arc<dyn MonitorEventSink>>,
}

impl FanoutEventSink {
    /// Creates a fan-out over `sinks`.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn MonitorEventSink>>) -> Self {
        Self {
            sinks,
        }
    }
}

impl MonitorEventSink for FanoutEventSink {
    fn record(&self, event: &MonitorEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

/// Sink that keeps events in memory; used by tests and the status surface.
#[derive(Default)]
pub struct MemoryEventSink {
    /// Recorded events.
    events: Mutex<Vec<MonitorEvent>>,
}

impl MemoryEventSink {
    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns the recorded events named `name`.
    #[must_use]
    pub fn named(&self, name: &str) -> Vec<MonitorEvent> {
        self.events().into_iter().filter(|event| event.event == name).collect()
    }
}

impl MonitorEventSink for MemoryEventSink {
    fn record(&self, event: &MonitorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
