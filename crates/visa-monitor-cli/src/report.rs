// crates/visa-monitor-cli/src/report.rs
// ============================================================================
// Module: Status Report
// Description: Aggregates a checked CSV into distribution and trend analytics.
// Purpose: Render the Markdown report and optional JSON summary for `report`.
// Dependencies: serde, serde_json, time, thiserror, visa-monitor-core, visa-monitor-store
// ============================================================================

//! ## Overview
//! The report reads the operator CSV after `check` has filled its status
//! column, classifies every row, and aggregates by day, ISO week, month, and
//! weekday. Rows with an empty status or a Not Found reading are excluded
//! from every statistic.
//!
//! ## Invariants
//! - Distribution order is Granted, Rejected/Closed, Proceedings, Unknown,
//!   Query Failed, then any unrecognized labels alphabetically.
//! - Daily volume is zero-filled across the full date range of the file.
//! - Rates are rounded to four decimals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_store::CsvTable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Days after which a Proceedings application counts as overdue.
pub const SLA_DAYS: i64 = 60;
/// Candidate date headers, exact before substring.
pub const DATE_COLUMNS: [&str; 2] = ["日期", "date"];
/// Candidate status headers, exact before substring.
pub const STATUS_COLUMNS: [&str; 4] = ["签证状态/Status", "状态", "status", "签证状态"];
/// Default report root.
pub const DEFAULT_REPORT_ROOT: &str = "reports";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Report errors.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Input CSV has no header row.
    #[error("input CSV is empty")]
    Empty,
    /// Input CSV has no status column.
    #[error("no status column ({0})")]
    MissingStatusColumn(String),
    /// Filesystem failure.
    #[error("{path}: {error}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying error.
        error: String,
    },
    /// JSON serialization failure.
    #[error("json summary: {0}")]
    Serialization(String),
}

/// First and last day of a set of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    /// Earliest day.
    pub first: Option<Date>,
    /// Latest day.
    pub last: Option<Date>,
    /// Inclusive day count.
    pub days_span: i64,
}

impl DateRange {
    /// Builds a range from optional bounds.
    fn new(first: Option<Date>, last: Option<Date>) -> Self {
        let days_span = match (first, last) {
            (Some(first), Some(last)) => (last - first).whole_days() + 1,
            _ => 0,
        };
        Self {
            first,
            last,
            days_span,
        }
    }
}

/// Row count for one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    /// Canonical English status name.
    pub status: String,
    /// Counted rows.
    pub count: usize,
}

/// First raw cell seen for a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusExample {
    /// Canonical English status name.
    pub status: String,
    /// Raw cell text.
    pub raw: String,
}

/// One day of the trend table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    /// Day.
    pub date: Date,
    /// Counted rows that day.
    pub day_total: usize,
    /// Granted rows that day.
    pub day_success: usize,
    /// `day_success / day_total`.
    pub day_success_rate: f64,
    /// Proceedings rows that day.
    pub day_proceedings: usize,
    /// `day_proceedings / day_total`.
    pub day_backlog_ratio: f64,
    /// Running total.
    pub cumulative_total: usize,
    /// Running Granted total.
    pub cumulative_success: usize,
    /// Running success rate.
    pub cumulative_success_rate: f64,
    /// Running Proceedings total.
    pub cumulative_proceedings: usize,
    /// Running backlog ratio.
    pub cumulative_backlog_ratio: f64,
}

/// Aggregate for an ISO week or calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    /// `2025-W23` or `2025-06`.
    pub bucket: String,
    /// Counted rows.
    pub total: usize,
    /// Granted rows.
    pub success: usize,
    /// `success / total`.
    pub success_rate: f64,
    /// Change in success rate against the previous bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_vs_prev: Option<f64>,
    /// Count per status.
    pub distribution: BTreeMap<String, usize>,
}

/// Proceedings rows past the SLA for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverdueDay {
    /// Submission day.
    pub date: Date,
    /// Proceedings rows that day.
    pub proceedings: usize,
    /// Age in days at report time.
    pub age_days: i64,
}

/// Counted rows for one day; zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyVolume {
    /// Day.
    pub date: Date,
    /// Counted rows.
    pub count: usize,
}

/// Full report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// RFC 3339 generation time.
    pub generated_at: String,
    /// ISO week of the generation time.
    pub generated_week: String,
    /// Range over all dated rows.
    pub date_range: DateRange,
    /// Range over counted rows.
    pub effective_date_range: DateRange,
    /// Data rows in the file.
    pub total_rows_scanned: usize,
    /// Rows with a counted status.
    pub rows_counted: usize,
    /// Count per status in display order.
    pub distribution: Vec<StatusCount>,
    /// Granted rows.
    pub success: usize,
    /// Rejected/Closed plus Query Failed rows.
    pub failures: usize,
    /// `success / rows_counted`.
    pub success_rate: f64,
    /// Granted plus Rejected/Closed over counted rows.
    pub processing_rate: f64,
    /// Rejected/Closed over counted rows.
    pub rejection_rate: f64,
    /// First raw text per status.
    pub raw_examples: Vec<StatusExample>,
    /// Per-day trend.
    pub daily_trend: Vec<DailyTrend>,
    /// Per ISO week, with week-over-week deltas.
    pub weekly: Vec<BucketSummary>,
    /// Per calendar month.
    pub monthly: Vec<BucketSummary>,
    /// Counted rows by weekday, Monday first.
    pub weekday_distribution: [usize; 7],
    /// Busiest weekday (0 = Monday), if any row was dated.
    pub weekday_peak: Option<usize>,
    /// Counted rows per day across `date_range`.
    pub submission_volume: Vec<DailyVolume>,
    /// SLA threshold in days.
    pub sla_days: i64,
    /// Proceedings rows older than the SLA.
    pub overdue_proceedings: usize,
    /// Overdue over all Proceedings rows.
    pub overdue_ratio: f64,
    /// Overdue rows per day.
    pub overdue_details: Vec<OverdueDay>,
}

/// Files written by [`write_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutput {
    /// Markdown report.
    pub markdown: PathBuf,
    /// Archived copy of the input, if it was copied.
    pub archived_input: Option<PathBuf>,
    /// JSON summary, if requested.
    pub json: Option<PathBuf>,
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// English names recognized by keyword, checked in order.
const KEYWORDS: [(&str, NormalizedStatus); 9] = [
    ("granted", NormalizedStatus::Granted),
    ("approved", NormalizedStatus::Granted),
    ("rejected", NormalizedStatus::RejectedClosed),
    ("closed", NormalizedStatus::RejectedClosed),
    ("proceedings", NormalizedStatus::Proceedings),
    ("not found", NormalizedStatus::NotFound),
    ("notfound", NormalizedStatus::NotFound),
    ("unknown", NormalizedStatus::Unknown),
    ("query failed", NormalizedStatus::QueryFailed),
];

/// Recognizes a status cell by its label, then by English keyword.
#[must_use]
pub fn recognize(raw: &str) -> Option<NormalizedStatus> {
    let trimmed = raw.trim();
    NormalizedStatus::from_label(trimmed).or_else(|| {
        let primary = trimmed.split('/').next().map_or(trimmed, str::trim);
        let lower = primary.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        KEYWORDS.iter().find(|(key, _)| lower.contains(key)).map(|(_, status)| *status)
    })
}

/// Classifies a status cell.
///
/// Returns `None` for rows excluded from statistics: empty cells and Not
/// Found readings. Recognized statuses map to their English name; anything
/// else keeps the text before the first `/`.
#[must_use]
pub fn classify(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let primary = trimmed.split('/').next().map_or(trimmed, str::trim);
    match recognize(trimmed) {
        Some(NormalizedStatus::NotFound) => None,
        Some(status) => Some(status.english().to_string()),
        None if primary.is_empty() => Some(trimmed.to_string()),
        None => Some(primary.to_string()),
    }
}

/// Parses `YYYY-MM-DD` or `YYYY/MM/DD`.
#[must_use]
pub fn parse_day(value: &str) -> Option<Date> {
    let value = value.trim();
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .or_else(|_| Date::parse(value, format_description!("[year]/[month]/[day]")))
        .ok()
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

/// Per-day status counts.
type DayCounts = BTreeMap<String, usize>;

/// Builds the report for `table` as of `now`.
///
/// # Errors
///
/// Returns [`ReportError::Empty`] without a header row and
/// [`ReportError::MissingStatusColumn`] when no status column exists.
pub fn build_summary(table: &CsvTable, now: OffsetDateTime) -> Result<ReportSummary, ReportError> {
    if table.headers.is_empty() {
        return Err(ReportError::Empty);
    }
    let status_idx = table
        .find_column(&STATUS_COLUMNS)
        .ok_or_else(|| ReportError::MissingStatusColumn(STATUS_COLUMNS.join(", ")))?;
    let date_idx = table.find_column(&DATE_COLUMNS);
    let today = now.date();

    let mut overall: DayCounts = BTreeMap::new();
    let mut examples: BTreeMap<String, String> = BTreeMap::new();
    let mut daily: BTreeMap<Date, DayCounts> = BTreeMap::new();
    let mut weekly: BTreeMap<String, DayCounts> = BTreeMap::new();
    let mut monthly: BTreeMap<String, DayCounts> = BTreeMap::new();
    let mut weekdays = [0_usize; 7];
    let mut first: Option<Date> = None;
    let mut last: Option<Date> = None;

    for row in &table.rows {
        let day = date_idx.and_then(|idx| row.get(idx)).and_then(|cell| parse_day(cell));
        if let Some(day) = day {
            first = Some(first.map_or(day, |current| current.min(day)));
            last = Some(last.map_or(day, |current| current.max(day)));
        }
        let Some(raw) = row.get(status_idx) else {
            continue;
        };
        let Some(status) = classify(raw) else {
            continue;
        };
        *overall.entry(status.clone()).or_default() += 1;
        examples.entry(status.clone()).or_insert_with(|| raw.trim().to_string());
        if let Some(day) = day {
            *daily.entry(day).or_default().entry(status.clone()).or_default() += 1;
            let week = weekly.entry(iso_week_label(day)).or_default();
            *week.entry(status.clone()).or_default() += 1;
            *monthly.entry(month_label(day)).or_default().entry(status).or_default() += 1;
            weekdays[usize::from(day.weekday().number_days_from_monday())] += 1;
        }
    }

    let rows_counted: usize = overall.values().sum();
    let granted = count_of(&overall, NormalizedStatus::Granted);
    let rejected = count_of(&overall, NormalizedStatus::RejectedClosed);
    let proceedings = count_of(&overall, NormalizedStatus::Proceedings);
    let failures = rejected + count_of(&overall, NormalizedStatus::QueryFailed);

    let (overdue_details, overdue_proceedings) = overdue(&daily, today);
    let date_range = DateRange::new(first, last);
    let effective_date_range =
        DateRange::new(daily.keys().next().copied(), daily.keys().next_back().copied());

    Ok(ReportSummary {
        generated_at: now.format(&Rfc3339).unwrap_or_default(),
        generated_week: iso_week_label(today),
        date_range,
        effective_date_range,
        total_rows_scanned: table.rows.len(),
        rows_counted,
        distribution: ordered(&overall)
            .into_iter()
            .map(|(status, count)| StatusCount {
                status,
                count,
            })
            .collect(),
        success: granted,
        failures,
        success_rate: ratio(granted, rows_counted),
        processing_rate: ratio(granted + rejected, rows_counted),
        rejection_rate: ratio(rejected, rows_counted),
        raw_examples: ordered_examples(&overall, examples),
        daily_trend: daily_trend(&daily),
        weekly: with_deltas(buckets(&weekly)),
        monthly: buckets(&monthly),
        weekday_distribution: weekdays,
        weekday_peak: weekday_peak(&weekdays),
        submission_volume: zero_filled(&daily, date_range),
        sla_days: SLA_DAYS,
        overdue_proceedings,
        overdue_ratio: ratio(overdue_proceedings, proceedings),
        overdue_details,
    })
}

/// Returns `part / whole` rounded to four decimals, or zero.
#[allow(clippy::cast_precision_loss, reason = "Row counts stay far below 2^52.")]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round4(part as f64 / whole as f64)
}

/// Rounds to four decimals.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Returns the count for a known status.
fn count_of(counts: &DayCounts, status: NormalizedStatus) -> usize {
    counts.get(status.english()).copied().unwrap_or(0)
}

/// Returns `2025-W23` for `day`.
fn iso_week_label(day: Date) -> String {
    let (year, week, _) = day.to_iso_week_date();
    format!("{year}-W{week:02}")
}

/// Returns `2025-06` for `day`.
fn month_label(day: Date) -> String {
    format!("{:04}-{:02}", day.year(), u8::from(day.month()))
}

/// Orders counts by display order, then alphabetically.
fn ordered(counts: &DayCounts) -> Vec<(String, usize)> {
    let mut out: Vec<(String, usize)> = NormalizedStatus::ALL
        .iter()
        .filter_map(|status| {
            counts.get(status.english()).map(|count| (status.english().to_string(), *count))
        })
        .collect();
    for (status, count) in counts {
        if NormalizedStatus::ALL.iter().all(|known| known.english() != status) {
            out.push((status.clone(), *count));
        }
    }
    out
}

/// Orders raw examples like the distribution.
fn ordered_examples(
    counts: &DayCounts,
    mut examples: BTreeMap<String, String>,
) -> Vec<StatusExample> {
    ordered(counts)
        .into_iter()
        .filter_map(|(status, _)| {
            examples.remove(&status).map(|raw| StatusExample {
                status,
                raw,
            })
        })
        .collect()
}

/// Builds the running daily trend.
fn daily_trend(daily: &BTreeMap<Date, DayCounts>) -> Vec<DailyTrend> {
    let mut cumulative_total = 0;
    let mut cumulative_success = 0;
    let mut cumulative_proceedings = 0;
    daily
        .iter()
        .map(|(day, counts)| {
            let day_total: usize = counts.values().sum();
            let day_success = count_of(counts, NormalizedStatus::Granted);
            let day_proceedings = count_of(counts, NormalizedStatus::Proceedings);
            cumulative_total += day_total;
            cumulative_success += day_success;
            cumulative_proceedings += day_proceedings;
            DailyTrend {
                date: *day,
                day_total,
                day_success,
                day_success_rate: ratio(day_success, day_total),
                day_proceedings,
                day_backlog_ratio: ratio(day_proceedings, day_total),
                cumulative_total,
                cumulative_success,
                cumulative_success_rate: ratio(cumulative_success, cumulative_total),
                cumulative_proceedings,
                cumulative_backlog_ratio: ratio(cumulative_proceedings, cumulative_total),
            }
        })
        .collect()
}

/// Summarizes keyed buckets in key order.
fn buckets(map: &BTreeMap<String, DayCounts>) -> Vec<BucketSummary> {
    map.iter()
        .map(|(bucket, counts)| {
            let total: usize = counts.values().sum();
            let success = count_of(counts, NormalizedStatus::Granted);
            BucketSummary {
                bucket: bucket.clone(),
                total,
                success,
                success_rate: ratio(success, total),
                delta_vs_prev: None,
                distribution: counts.clone(),
            }
        })
        .collect()
}

/// Fills week-over-week success-rate deltas.
fn with_deltas(mut weeks: Vec<BucketSummary>) -> Vec<BucketSummary> {
    let mut previous: Option<f64> = None;
    for week in &mut weeks {
        week.delta_vs_prev = previous.map(|rate| round4(week.success_rate - rate));
        previous = Some(week.success_rate);
    }
    weeks
}

/// Returns the first weekday with the highest count.
fn weekday_peak(weekdays: &[usize; 7]) -> Option<usize> {
    let max = weekdays.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return None;
    }
    weekdays.iter().position(|count| *count == max)
}

/// Zero-fills daily volume across `range`.
fn zero_filled(daily: &BTreeMap<Date, DayCounts>, range: DateRange) -> Vec<DailyVolume> {
    let (Some(first), Some(last)) = (range.first, range.last) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut day = first;
    loop {
        let count = daily.get(&day).map_or(0, |counts| counts.values().sum());
        out.push(DailyVolume {
            date: day,
            count,
        });
        match day.next_day() {
            Some(next) if next <= last => day = next,
            _ => break,
        }
    }
    out
}

/// Collects Proceedings rows older than [`SLA_DAYS`].
fn overdue(daily: &BTreeMap<Date, DayCounts>, today: Date) -> (Vec<OverdueDay>, usize) {
    let mut details = Vec::new();
    let mut total = 0;
    for (day, counts) in daily {
        let age_days = (today - *day).whole_days();
        let proceedings = count_of(counts, NormalizedStatus::Proceedings);
        if age_days > SLA_DAYS && proceedings > 0 {
            total += proceedings;
            details.push(OverdueDay {
                date: *day,
                proceedings,
                age_days,
            });
        }
    }
    (details, total)
}

// ============================================================================
// SECTION: Markdown
// ============================================================================

/// Formats a ratio as a percentage with two decimals.
fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Formats an optional day.
fn day_or_dash(day: Option<Date>) -> String {
    day.map_or_else(|| "-".to_string(), |day| day.to_string())
}

/// Renders the Markdown report.
#[must_use]
pub fn render_markdown(summary: &ReportSummary) -> String {
    let mut out = String::new();
    let range = summary.date_range;
    let effective = summary.effective_date_range;
    let _ = writeln!(out, "# Visa Status Detailed Report / 签证状态详细分析报告\n");
    let _ = writeln!(
        out,
        "Generated at (UTC): {}  (ISO Week: {})",
        summary.generated_at, summary.generated_week
    );
    let _ = writeln!(
        out,
        "Date range (all rows) / 总日期范围: {} ~ {} (span: {})",
        day_or_dash(range.first),
        day_or_dash(range.last),
        range.days_span
    );
    let _ = writeln!(
        out,
        "Effective range (counted) / 有效范围: {} ~ {} (span: {})",
        day_or_dash(effective.first),
        day_or_dash(effective.last),
        effective.days_span
    );
    let _ = writeln!(out, "Rows scanned / 扫描行数: {}", summary.total_rows_scanned);
    let _ = writeln!(out, "Rows counted / 统计行数: {}\n", summary.rows_counted);

    let _ = writeln!(out, "## 1. Overall Distribution / 总体分布");
    let _ = writeln!(out, "Status | Count | Percent\n---|---:|---:");
    for entry in &summary.distribution {
        let _ = writeln!(
            out,
            "{} | {} | {}",
            entry.status,
            entry.count,
            pct(ratio(entry.count, summary.rows_counted))
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Success (Granted) / 通过数: {}", summary.success);
    let _ = writeln!(out, "Failures (Rejected/Closed + Query Failed) / 失败数: {}", summary.failures);
    let _ = writeln!(out, "Success rate / 通过率: {}", pct(summary.success_rate));
    let _ = writeln!(out, "Processing rate / 已处理率: {}", pct(summary.processing_rate));
    let _ = writeln!(out, "Rejection rate / 拒签率: {}\n", pct(summary.rejection_rate));

    let _ = writeln!(out, "## 2. Daily Trend / 每日趋势");
    let _ = writeln!(
        out,
        "Date | Day Total | Granted | Proceedings | Day Success% | Day Backlog% | Cumul Total | \
         Cumul Granted | Cumul Success% | Cumul Backlog%"
    );
    let _ = writeln!(out, "---|---:|---:|---:|---:|---:|---:|---:|---:|---:");
    for day in &summary.daily_trend {
        let _ = writeln!(
            out,
            "{} | {} | {} | {} | {} | {} | {} | {} | {} | {}",
            day.date,
            day.day_total,
            day.day_success,
            day.day_proceedings,
            pct(day.day_success_rate),
            pct(day.day_backlog_ratio),
            day.cumulative_total,
            day.cumulative_success,
            pct(day.cumulative_success_rate),
            pct(day.cumulative_backlog_ratio)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## 3. Weekly Summary / 每周汇总");
    let _ = writeln!(out, "Week | Total | Granted | Success% | Delta vs Prev | Distribution");
    let _ = writeln!(out, "---|---:|---:|---:|---:|---");
    for week in &summary.weekly {
        let delta = week.delta_vs_prev.map_or_else(|| "n/a".to_string(), pct);
        let _ = writeln!(
            out,
            "{} | {} | {} | {} | {} | {}",
            week.bucket,
            week.total,
            week.success,
            pct(week.success_rate),
            delta,
            distribution_json(&week.distribution)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## 4. Monthly Summary / 每月汇总");
    let _ = writeln!(out, "Month | Total | Granted | Success% | Distribution");
    let _ = writeln!(out, "---|---:|---:|---:|---");
    for month in &summary.monthly {
        let _ = writeln!(
            out,
            "{} | {} | {} | {} | {}",
            month.bucket,
            month.total,
            month.success,
            pct(month.success_rate),
            distribution_json(&month.distribution)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## 5. Weekday Distribution / 工作日分布");
    let _ = writeln!(out, "Weekday(0=Mon) | Count | Percent\n---|---:|---:");
    let weekday_total: usize = summary.weekday_distribution.iter().sum();
    for (index, count) in summary.weekday_distribution.iter().enumerate() {
        let _ = writeln!(out, "{index} | {count} | {}", pct(ratio(*count, weekday_total)));
    }
    let peak = summary.weekday_peak.map_or_else(|| "-".to_string(), |day| day.to_string());
    let _ = writeln!(out, "\nPeak weekday / 峰值工作日: {peak}\n");

    let _ = writeln!(out, "## 6. Submission Volume Per Day / 每日提交量");
    let _ = writeln!(out, "Date | Count\n---|---:");
    for day in &summary.submission_volume {
        let _ = writeln!(out, "{} | {}", day.date, day.count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## 7. Raw Example Per Status / 各状态示例原文");
    for example in &summary.raw_examples {
        let _ = writeln!(out, "- {}: {}", example.status, example.raw);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## 8. SLA Overdue ({} days) / 超期审理中", summary.sla_days);
    let _ = writeln!(out, "Overdue Proceedings count: {}", summary.overdue_proceedings);
    let _ = writeln!(out, "Overdue vs current Proceedings ratio: {}", pct(summary.overdue_ratio));
    if !summary.overdue_details.is_empty() {
        let _ = writeln!(out, "Date | Proceedings | AgeDays\n---|---:|---:");
        for day in &summary.overdue_details {
            let _ = writeln!(out, "{} | {} | {}", day.date, day.proceedings, day.age_days);
        }
    }
    out
}

/// Renders a bucket distribution as compact JSON.
fn distribution_json(distribution: &BTreeMap<String, usize>) -> String {
    serde_json::to_string(distribution).unwrap_or_default()
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Returns `reports/{date}/{time}/summary.md` for `now`.
#[must_use]
pub fn default_markdown_path(now: OffsetDateTime) -> PathBuf {
    let date = now.date().to_string();
    let time = format!("{:02}-{:02}-{:02}", now.hour(), now.minute(), now.second());
    Path::new(DEFAULT_REPORT_ROOT).join(date).join(time).join("summary.md")
}

/// Reads `input`, writes the Markdown report, archives the input beside it,
/// and writes the JSON summary when requested.
///
/// # Errors
///
/// Returns [`ReportError`] when the input cannot be read or aggregated, or
/// an output cannot be written.
pub fn write_report(
    input: &Path,
    markdown: &Path,
    json: Option<&Path>,
    now: OffsetDateTime,
) -> Result<ReportOutput, ReportError> {
    let text = fs::read_to_string(input).map_err(|err| io_error(input, &err))?;
    let summary = build_summary(&CsvTable::parse(&text), now)?;

    let out_dir = markdown.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = out_dir {
        fs::create_dir_all(dir).map_err(|err| io_error(dir, &err))?;
    }
    fs::write(markdown, render_markdown(&summary)).map_err(|err| io_error(markdown, &err))?;

    let archived_input = match input.file_name() {
        Some(name) => {
            let target = out_dir.map_or_else(|| PathBuf::from(name), |dir| dir.join(name));
            if same_file(input, &target) {
                None
            } else {
                fs::copy(input, &target).map_err(|err| io_error(&target, &err))?;
                Some(target)
            }
        }
        None => None,
    };

    if let Some(json_path) = json {
        let body = serde_json::to_string_pretty(&summary)
            .map_err(|err| ReportError::Serialization(err.to_string()))?;
        if let Some(dir) = json_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|err| io_error(dir, &err))?;
        }
        fs::write(json_path, body).map_err(|err| io_error(json_path, &err))?;
    }

    Ok(ReportOutput {
        markdown: markdown.to_path_buf(),
        archived_input,
        json: json.map(Path::to_path_buf),
    })
}

/// Returns true when both paths resolve to the same file.
fn same_file(left: &Path, right: &Path) -> bool {
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

/// Wraps an I/O error with its path.
fn io_error(path: &Path, err: &std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.display().to_string(),
        error: err.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
