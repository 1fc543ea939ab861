// crates/visa-monitor-store/src/failures.rs
// ============================================================================
// Module: Failure Export
// Description: Append-only daily CSV of failed lookups and batch counters.
// Purpose: Give operators a reviewable trail of codes that could not be read.
// Dependencies: crate::atomic, crate::csv, visa-monitor-core, time
// ============================================================================

//! ## Overview
//! Each failed lookup appends one row to `{log_dir}/fails/{date}_fails.csv`.
//! The header is written when the file is first created. The consecutive
//! failure column is supplied by the caller: the daemon passes the stored
//! snapshot counter, batch mode keeps its own [`FailureCounters`] in
//! `counters.json` through the atomic writer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use time::Date;
use time::macros::format_description;
use visa_monitor_core::QueryCode;
use visa_monitor_core::StoreError;

use crate::atomic::AtomicFile;
use crate::csv::write_row;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header row of every failure export.
pub const FAILS_HEADER: [&str; 5] =
    ["日期/Date", "查询码/Code", "状态/Status", "备注/Remark", "连续失败/ConsecutiveFailures"];

/// File name of the batch counter document.
pub const COUNTERS_FILE_NAME: &str = "counters.json";

// ============================================================================
// SECTION: Types
// ============================================================================

/// One failed lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Date associated with the code (batch row date or check date).
    pub date: String,
    /// Failed code.
    pub code: QueryCode,
    /// Status label written to the status column.
    pub status: String,
    /// Failure detail.
    pub remark: String,
    /// Consecutive failure count including this one.
    pub consecutive_failures: u32,
}

/// Daily append-only failure export.
#[derive(Debug, Clone)]
pub struct FailureLog {
    /// Directory holding the daily files.
    dir: PathBuf,
}

impl FailureLog {
    /// Creates a log writing under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
        }
    }

    /// Returns the export path for `day`.
    #[must_use]
    pub fn path_for(&self, day: Date) -> PathBuf {
        self.dir.join(format!("{}_fails.csv", format_day(day)))
    }

    /// Appends `record` to the export for `day`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory or file cannot be
    /// written.
    pub fn append(&self, day: Date, record: &FailureRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|err| StoreError::Io(err.to_string()))?;
        let path = self.path_for(day);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| StoreError::Io(err.to_string()))?;
        let is_new = file.metadata().map_err(|err| StoreError::Io(err.to_string()))?.len() == 0;
        let mut buf = Vec::new();
        if is_new {
            write_row(&mut buf, &FAILS_HEADER).map_err(|err| StoreError::Io(err.to_string()))?;
        }
        let consecutive = record.consecutive_failures.to_string();
        write_row(
            &mut buf,
            &[
                record.date.as_str(),
                record.code.as_str(),
                record.status.as_str(),
                record.remark.as_str(),
                consecutive.as_str(),
            ],
        )
        .map_err(|err| StoreError::Io(err.to_string()))?;
        file.write_all(&buf).map_err(|err| StoreError::Io(err.to_string()))?;
        Ok(path)
    }
}

/// Cross-run consecutive failure counters for batch mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCounters {
    /// Counter per code.
    #[serde(default)]
    pub counts: BTreeMap<QueryCode, u32>,
}

impl FailureCounters {
    /// Increments and returns the counter for `code`.
    pub fn record_failure(&mut self, code: &QueryCode) -> u32 {
        let count = self.counts.entry(code.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Clears the counter for `code`.
    pub fn record_success(&mut self, code: &QueryCode) {
        self.counts.remove(code);
    }

    /// Returns the counter for `code`.
    #[must_use]
    pub fn get(&self, code: &QueryCode) -> u32 {
        self.counts.get(code).copied().unwrap_or(0)
    }
}

/// Atomic file holding [`FailureCounters`].
#[derive(Debug, Clone)]
pub struct CountersStore {
    /// Atomic file handle.
    file: AtomicFile,
}

impl CountersStore {
    /// Creates a store for `counters.json` inside `fails_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the path is unusable.
    pub fn in_dir(fails_dir: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            file: AtomicFile::new(&fails_dir.join(COUNTERS_FILE_NAME))?,
        })
    }

    /// Loads the counters, empty on first run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when neither copy parses.
    pub fn load(&self) -> Result<FailureCounters, StoreError> {
        let loaded = self.file.load(|bytes| {
            serde_json::from_slice::<FailureCounters>(bytes).map_err(|err| err.to_string())
        })?;
        Ok(loaded.value.unwrap_or_default())
    }

    /// Writes the counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the write fails.
    pub fn save(&self, counters: &FailureCounters) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(counters)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        self.file.write(&bytes)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Formats a date as `YYYY-MM-DD`.
#[must_use]
pub fn format_day(day: Date) -> String {
    day.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| day.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
