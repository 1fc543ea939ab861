// crates/visa-monitor-cli/tests/report_files.rs
// ============================================================================
// Module: Report Output Tests
// Description: End-to-end report writing from a checked CSV on disk.
// Purpose: Ensure reports land next to an archived input with optional JSON.
// Dependencies: visa-monitor-cli, serde_json, tempfile, time
// ============================================================================

//! ## Overview
//! Generates codes, fills in statuses the way `check` would, and writes the
//! Markdown and JSON outputs into a temporary directory.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;

use tempfile::TempDir;
use time::macros::date;
use time::macros::datetime;
use visa_monitor_cli::codegen::CodegenOptions;
use visa_monitor_cli::codegen::generate_codes;
use visa_monitor_cli::report::ReportError;
use visa_monitor_cli::report::default_markdown_path;
use visa_monitor_cli::report::write_report;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes a checked CSV for one generated week and returns its path.
fn checked_csv(dir: &TempDir) -> std::path::PathBuf {
    let mut options = CodegenOptions::new(date!(2025 - 06 - 06));
    options.start = date!(2025 - 06 - 02);
    options.per_day = 2;
    let rows = generate_codes(&options).unwrap();
    let statuses = ["Granted / 已通过", "Proceedings / 审理中", "Not Found / 未找到", ""];
    let mut csv = String::from("日期,查询码,签证状态/Status\n");
    for (index, row) in rows.iter().enumerate() {
        let status = statuses[index % statuses.len()];
        let _ = writeln!(csv, "{},{},{status}", row.date, row.code);
    }
    let path = dir.path().join("query_codes.csv");
    fs::write(&path, csv).unwrap();
    path
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Writes Markdown, archives the input, and writes the JSON summary.
#[test]
fn report_archives_input_and_writes_json() {
    let dir = TempDir::new().unwrap();
    let input = checked_csv(&dir);
    let markdown = dir.path().join("reports/run/summary.md");
    let json = dir.path().join("reports/run/summary.json");

    let output =
        write_report(&input, &markdown, Some(&json), datetime!(2025-09-01 08:00 UTC)).unwrap();

    assert_eq!(output.markdown, markdown);
    let archived = output.archived_input.unwrap();
    assert_eq!(archived, dir.path().join("reports/run/query_codes.csv"));
    assert_eq!(fs::read(&archived).unwrap(), fs::read(&input).unwrap());

    let text = fs::read_to_string(&markdown).unwrap();
    assert!(text.starts_with("# Visa Status Detailed Report"));

    let body = fs::read_to_string(&json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["total_rows_scanned"], 10);
    // Not Found and empty rows are excluded, leaving three Granted and three Proceedings.
    assert_eq!(value["rows_counted"], 6);
    assert_eq!(value["success"], 3);
    assert_eq!(value["overdue_proceedings"], 3);
    assert_eq!(value["sla_days"], 60);
}

/// Skips the archive copy when the report sits next to its input.
#[test]
fn report_beside_input_does_not_copy_over_itself() {
    let dir = TempDir::new().unwrap();
    let input = checked_csv(&dir);
    let markdown = dir.path().join("summary.md");

    let output = write_report(&input, &markdown, None, datetime!(2025-09-01 08:00 UTC)).unwrap();

    assert_eq!(output.archived_input, None);
    assert_eq!(output.json, None);
    assert!(markdown.exists());
}

/// Surfaces unreadable input as an I/O error.
#[test]
fn missing_input_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = write_report(
        &dir.path().join("absent.csv"),
        &dir.path().join("summary.md"),
        None,
        datetime!(2025-09-01 08:00 UTC),
    );
    assert!(matches!(result, Err(ReportError::Io { .. })));
}

/// Places default reports under a per-run timestamped directory.
#[test]
fn default_markdown_path_is_timestamped() {
    let path = default_markdown_path(datetime!(2025-09-01 08:05:09 UTC));
    assert_eq!(path, std::path::Path::new("reports/2025-09-01/08-05-09/summary.md"));
}
