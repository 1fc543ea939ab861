// crates/visa-monitor-cli/src/codegen.rs
// ============================================================================
// Module: Query Code Generation
// Description: Builds sequential application codes over a calendar range.
// Purpose: Produce the operator CSV consumed by `check` and `report`.
// Dependencies: time, thiserror, visa-monitor-store
// ============================================================================

//! ## Overview
//! Codes follow `{prefix}{YYYY}{MMDD}{seq:04}`, e.g. `PEKI202506020001`.
//! Each included calendar day yields `per_day` codes numbered from `0001`.
//! Weekends are skipped unless requested, and individual weekdays can be
//! excluded by their ISO number (`1` = Monday .. `7` = Sunday).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;
use time::Date;
use time::macros::date;
use time::macros::format_description;
use visa_monitor_store::CsvTable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// First day the portal issued codes in this format.
pub const DEFAULT_START: Date = date!(2025 - 06 - 01);
/// Default code prefix.
pub const DEFAULT_PREFIX: &str = "PEKI";
/// Default codes per day.
pub const DEFAULT_PER_DAY: u32 = 5;
/// Header row of the generated CSV.
pub const CSV_HEADERS: [&str; 2] = ["日期", "查询码"];
/// Largest sequence number representable in four digits.
const MAX_PER_DAY: u32 = 9999;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Generation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Code prefix, 1 to 8 ASCII letters or digits.
    pub prefix: String,
    /// First day, inclusive.
    pub start: Date,
    /// Last day, inclusive.
    pub end: Date,
    /// Codes per included day.
    pub per_day: u32,
    /// Include Saturday and Sunday.
    pub include_weekends: bool,
    /// ISO weekday numbers (1 = Monday) never generated.
    pub excluded_weekdays: BTreeSet<u8>,
}

impl CodegenOptions {
    /// Options with defaults for everything but the end date.
    #[must_use]
    pub fn new(end: Date) -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            start: DEFAULT_START,
            end,
            per_day: DEFAULT_PER_DAY,
            include_weekends: false,
            excluded_weekdays: BTreeSet::new(),
        }
    }

    /// Returns true when codes are generated for `day`.
    #[must_use]
    pub fn includes(&self, day: Date) -> bool {
        let number = day.weekday().number_from_monday();
        (self.include_weekends || number <= 5) && !self.excluded_weekdays.contains(&number)
    }
}

/// One generated CSV row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Calendar day the code belongs to.
    pub date: Date,
    /// Full code.
    pub code: String,
}

/// Code generation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodegenError {
    /// Parameters are out of range.
    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Generates codes for every included day between `start` and `end`.
///
/// # Errors
///
/// Returns [`CodegenError::Invalid`] for an empty or non-alphanumeric
/// prefix, a `per_day` outside `1 ..= 9999`, or `start` after `end`.
pub fn generate_codes(options: &CodegenOptions) -> Result<Vec<GeneratedCode>, CodegenError> {
    let prefix = options.prefix.trim().to_ascii_uppercase();
    if prefix.is_empty() || prefix.len() > 8 || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CodegenError::Invalid(format!(
            "prefix must be 1-8 ASCII letters or digits, got '{}'",
            options.prefix
        )));
    }
    if !(1 ..= MAX_PER_DAY).contains(&options.per_day) {
        return Err(CodegenError::Invalid(format!(
            "per-day must be between 1 and {MAX_PER_DAY}, got {}",
            options.per_day
        )));
    }
    if options.start > options.end {
        return Err(CodegenError::Invalid(format!(
            "start {} is after end {}",
            options.start, options.end
        )));
    }

    let mut rows = Vec::new();
    let mut day = options.start;
    loop {
        if options.includes(day) {
            let stamp = format!("{:04}{:02}{:02}", day.year(), u8::from(day.month()), day.day());
            for seq in 1 ..= options.per_day {
                rows.push(GeneratedCode {
                    date: day,
                    code: format!("{prefix}{stamp}{seq:04}"),
                });
            }
        }
        match day.next_day() {
            Some(next) if next <= options.end => day = next,
            _ => break,
        }
    }
    Ok(rows)
}

/// Parses weekday digits such as `"35"`, `"3 5"`, or `"3,5"`.
///
/// # Errors
///
/// Returns [`CodegenError::Invalid`] for characters other than `1`..`7`,
/// spaces, and commas.
pub fn parse_excluded_weekdays(value: &str) -> Result<BTreeSet<u8>, CodegenError> {
    let mut days = BTreeSet::new();
    for c in value.chars() {
        match c {
            '1' ..= '7' => {
                if let Some(day) = c.to_digit(10).and_then(|digit| u8::try_from(digit).ok()) {
                    days.insert(day);
                }
            }
            ' ' | ',' => {}
            other => {
                return Err(CodegenError::Invalid(format!(
                    "exclude-weekdays accepts digits 1-7 (1=Mon), got '{other}'"
                )));
            }
        }
    }
    Ok(days)
}

/// Parses a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`CodegenError::Invalid`] when the value is not a calendar date.
pub fn parse_date(value: &str) -> Result<Date, CodegenError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|err| CodegenError::Invalid(format!("{value}: {err}")))
}

/// Renders rows as the operator CSV.
#[must_use]
pub fn render_csv(rows: &[GeneratedCode]) -> String {
    let table = CsvTable {
        headers: CSV_HEADERS.iter().map(ToString::to_string).collect(),
        rows: rows.iter().map(|row| vec![row.date.to_string(), row.code.clone()]).collect(),
    };
    table.to_csv_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
