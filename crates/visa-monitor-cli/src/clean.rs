// crates/visa-monitor-cli/src/clean.rs
// ============================================================================
// Module: Code Cleanup
// Description: Filters a checked CSV down to the codes worth monitoring.
// Purpose: Turn `check` output into `[[codes]]` entries for the monitor config.
// Dependencies: serde, toml, time, thiserror, visa-monitor-{core,runtime,store}
// ============================================================================

//! ## Overview
//! `clean` reads the CSV that `check` filled in, keeps the latest status of
//! each code, and selects codes by status letter:
//! `n` Not Found, `g` Granted, `p` Proceedings, `r` Rejected/Closed.
//! Without a keep filter only Not Found codes are dropped. The selection is
//! written as `[[codes]]` tables ready to paste into `config.toml`.
//!
//! ## Invariants
//! - The latest row of a code is the one with the greatest date text; ties
//!   keep the earlier row.
//! - Codes are upper-cased and emitted in ascending order.
//! - Unknown, Query Failed, and unrecognized cells count as `other` and are
//!   kept by default but never selected by a keep filter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_runtime::batch::CODE_COLUMNS;
use visa_monitor_runtime::batch::DATE_COLUMNS;
use visa_monitor_store::CsvTable;

use crate::report::STATUS_COLUMNS;
use crate::report::recognize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Cleanup errors.
#[derive(Debug, Error)]
pub enum CleanError {
    /// Input CSV has no header row.
    #[error("input CSV is empty")]
    Empty,
    /// A required column is missing.
    #[error("no {0} column")]
    MissingColumn(&'static str),
    /// `-k` named something other than `n`, `g`, `p`, or `r`.
    #[error("invalid keep filter {0:?}; use letters from n, g, p, r")]
    InvalidKeep(String),
    /// `-fm` could not be parsed.
    #[error("invalid monitor fields {0:?}; use t:ADDRESS,f:MINUTES")]
    InvalidFields(String),
    /// Filesystem failure.
    #[error("{path}: {error}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying error.
        error: String,
    },
    /// TOML serialization failure.
    #[error("toml output: {0}")]
    Serialization(String),
}

/// Status bucket used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusKey {
    /// Granted.
    Granted,
    /// Proceedings.
    Proceedings,
    /// Rejected or closed.
    Rejected,
    /// Not Found.
    NotFound,
    /// Anything else, including empty cells.
    Other,
}

impl StatusKey {
    /// Keys in summary order.
    pub const ALL: [Self; 5] =
        [Self::Granted, Self::Proceedings, Self::Rejected, Self::NotFound, Self::Other];

    /// Buckets a raw status cell.
    #[must_use]
    pub fn of(raw: &str) -> Self {
        match recognize(raw) {
            Some(NormalizedStatus::Granted) => Self::Granted,
            Some(NormalizedStatus::Proceedings) => Self::Proceedings,
            Some(NormalizedStatus::RejectedClosed) => Self::Rejected,
            Some(NormalizedStatus::NotFound) => Self::NotFound,
            Some(NormalizedStatus::Unknown | NormalizedStatus::QueryFailed) | None => Self::Other,
        }
    }

    /// Filter letter, or `other`.
    #[must_use]
    pub const fn letter(self) -> &'static str {
        match self {
            Self::Granted => "g",
            Self::Proceedings => "p",
            Self::Rejected => "r",
            Self::NotFound => "n",
            Self::Other => "other",
        }
    }

    const fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'g' => Some(Self::Granted),
            'p' => Some(Self::Proceedings),
            'r' => Some(Self::Rejected),
            'n' => Some(Self::NotFound),
            _ => None,
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// Which codes survive the cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeepFilter {
    /// Everything except Not Found.
    #[default]
    DropNotFound,
    /// Only the listed statuses.
    Only(BTreeSet<StatusKey>),
}

impl KeepFilter {
    /// Parses `gp`, `g,r`, or `G, P`.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::InvalidKeep`] on an unknown letter or an empty list.
    pub fn parse(value: &str) -> Result<Self, CleanError> {
        let mut keys = BTreeSet::new();
        for letter in value.chars().filter(|ch| *ch != ',' && !ch.is_whitespace()) {
            let key = StatusKey::from_letter(letter.to_ascii_lowercase())
                .ok_or_else(|| CleanError::InvalidKeep(value.to_string()))?;
            keys.insert(key);
        }
        if keys.is_empty() {
            return Err(CleanError::InvalidKeep(value.to_string()));
        }
        Ok(Self::Only(keys))
    }

    /// Returns true when codes in `key` are kept.
    #[must_use]
    pub fn keeps(&self, key: StatusKey) -> bool {
        match self {
            Self::DropNotFound => key != StatusKey::NotFound,
            Self::Only(keys) => keys.contains(&key),
        }
    }
}

/// Monitor fields attached to every emitted code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorFields {
    /// Email recipient; sets `channel = "email"`.
    pub target: Option<String>,
    /// Check interval in minutes.
    pub freq_minutes: Option<u32>,
}

impl MonitorFields {
    /// Parses `t:you@example.com,f:60`; long keys `target` and
    /// `freq_minutes` are accepted too.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::InvalidFields`] on an unknown key, a missing
    /// `:`, an empty target, or a non-positive frequency.
    pub fn parse(value: &str) -> Result<Self, CleanError> {
        let invalid = || CleanError::InvalidFields(value.to_string());
        let mut fields = Self::default();
        for part in value.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let (key, field) = part.split_once(':').ok_or_else(invalid)?;
            let field = field.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "t" | "target" if !field.is_empty() => fields.target = Some(field.to_string()),
                "f" | "freq_minutes" => {
                    let minutes = field.parse::<u32>().ok().filter(|minutes| *minutes > 0);
                    fields.freq_minutes = Some(minutes.ok_or_else(invalid)?);
                }
                _ => return Err(invalid()),
            }
        }
        Ok(fields)
    }
}

/// One emitted `[[codes]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeEntry {
    /// Query code.
    pub code: String,
    /// `email` when a target is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Recipient address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Check interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freq_minutes: Option<u32>,
}

#[derive(Serialize)]
struct CodesDocument<'a> {
    codes: &'a [CodeEntry],
}

/// Cleanup result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanOutcome {
    /// Distinct codes in the input.
    pub total: usize,
    /// Selected codes, ascending.
    pub entries: Vec<CodeEntry>,
    /// Kept codes per status.
    pub kept: BTreeMap<StatusKey, usize>,
    /// Dropped codes per status.
    pub removed: BTreeMap<StatusKey, usize>,
}

impl CleanOutcome {
    /// Number of dropped codes.
    #[must_use]
    pub fn removed_total(&self) -> usize {
        self.removed.values().sum()
    }

    /// Renders the selection as `[[codes]]` TOML.
    ///
    /// # Errors
    ///
    /// Returns [`CleanError::Serialization`] if TOML encoding fails.
    pub fn to_toml(&self) -> Result<String, CleanError> {
        toml::to_string(&CodesDocument {
            codes: &self.entries,
        })
        .map_err(|err| CleanError::Serialization(err.to_string()))
    }
}

// ============================================================================
// SECTION: Cleanup
// ============================================================================

/// Returns the latest status bucket of each code.
///
/// # Errors
///
/// Returns [`CleanError::Empty`] without a header row and
/// [`CleanError::MissingColumn`] without a code or status column.
pub fn latest_statuses(table: &CsvTable) -> Result<BTreeMap<String, StatusKey>, CleanError> {
    if table.headers.is_empty() {
        return Err(CleanError::Empty);
    }
    let code_idx = table.find_column(&CODE_COLUMNS).ok_or(CleanError::MissingColumn("code"))?;
    let status_idx =
        table.find_column(&STATUS_COLUMNS).ok_or(CleanError::MissingColumn("status"))?;
    let date_idx = table.find_column(&DATE_COLUMNS);

    let mut latest: BTreeMap<String, (String, StatusKey)> = BTreeMap::new();
    for row in &table.rows {
        let code = row.get(code_idx).map(|cell| cell.trim().to_uppercase()).unwrap_or_default();
        if code.is_empty() {
            continue;
        }
        let date = date_idx.and_then(|idx| row.get(idx)).map_or("", |cell| cell.trim());
        let key = row.get(status_idx).map_or(StatusKey::Other, |cell| StatusKey::of(cell));
        if latest.get(&code).is_none_or(|(seen, _)| date > seen.as_str()) {
            latest.insert(code, (date.to_string(), key));
        }
    }
    Ok(latest.into_iter().map(|(code, (_, key))| (code, key)).collect())
}

/// Selects codes from `table`.
///
/// # Errors
///
/// Propagates [`latest_statuses`] errors.
pub fn clean_table(
    table: &CsvTable,
    keep: &KeepFilter,
    fields: &MonitorFields,
) -> Result<CleanOutcome, CleanError> {
    let latest = latest_statuses(table)?;
    let mut outcome = CleanOutcome {
        total: latest.len(),
        ..CleanOutcome::default()
    };
    for (code, key) in latest {
        if !keep.keeps(key) {
            *outcome.removed.entry(key).or_default() += 1;
            continue;
        }
        *outcome.kept.entry(key).or_default() += 1;
        outcome.entries.push(CodeEntry {
            code,
            channel: fields.target.as_ref().map(|_| "email".to_string()),
            target: fields.target.clone(),
            freq_minutes: fields.freq_minutes,
        });
    }
    Ok(outcome)
}

/// Default output next to `input`: `{stem}_cleaned_{YYYYMMDD_HHMMSS}.toml`.
#[must_use]
pub fn default_output_path(input: &Path, now: OffsetDateTime) -> PathBuf {
    let stem = input.file_stem().map_or_else(
        || "codes".to_string(),
        |stem| stem.to_string_lossy().into_owned(),
    );
    let stamp = now
        .format(format_description!("[year][month][day]_[hour][minute][second]"))
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_cleaned_{stamp}.toml"))
}

/// Reads `input`, selects codes, and writes the TOML to `output`.
///
/// # Errors
///
/// Returns [`CleanError::Io`] on filesystem failures and propagates
/// parsing and serialization errors.
pub fn write_clean(
    input: &Path,
    output: &Path,
    keep: &KeepFilter,
    fields: &MonitorFields,
) -> Result<CleanOutcome, CleanError> {
    let text = fs::read_to_string(input).map_err(|err| io_error(input, &err))?;
    let outcome = clean_table(&CsvTable::parse(&text), keep, fields)?;
    if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|err| io_error(dir, &err))?;
    }
    fs::write(output, outcome.to_toml()?).map_err(|err| io_error(output, &err))?;
    Ok(outcome)
}

fn io_error(path: &Path, err: &std::io::Error) -> CleanError {
    CleanError::Io {
        path: path.display().to_string(),
        error: err.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
