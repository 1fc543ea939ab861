// crates/visa-monitor-cli/tests/clean_files.rs
// ============================================================================
// Module: Clean Output Tests
// Description: End-to-end cleanup of a checked CSV into monitor code tables.
// Purpose: Ensure the written TOML loads as `[[codes]]` with the chosen fields.
// Dependencies: visa-monitor-cli, tempfile, time, toml
// ============================================================================

//! ## Overview
//! End-to-end cleanup of a checked CSV into monitor code tables.

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

use std::fs;

use tempfile::TempDir;
use time::macros::datetime;
use visa_monitor_cli::clean::CleanError;
use visa_monitor_cli::clean::KeepFilter;
use visa_monitor_cli::clean::MonitorFields;
use visa_monitor_cli::clean::StatusKey;
use visa_monitor_cli::clean::default_output_path;
use visa_monitor_cli::clean::write_clean;

const CHECKED: &str = "日期,查询码,签证状态/Status\n\
    2025-06-02,PEKI202506020001,Proceedings / 审理中\n\
    2025-06-02,PEKI202506020002,Not Found / 未找到\n\
    2025-06-03,PEKI202506030001,Granted / 已通过\n\
    2025-06-03,PEKI202506030002,\n\
    2025-06-10,PEKI202506020002,Not Found / 未找到\n";

fn codes(path: &std::path::Path) -> Vec<toml::Table> {
    let document: toml::Table = toml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    document["codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry.as_table().unwrap().clone())
        .collect()
}

#[test]
fn default_cleanup_drops_not_found_codes() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("query_codes.csv");
    fs::write(&input, CHECKED).unwrap();
    let output = dir.path().join("out").join("codes.toml");

    let outcome =
        write_clean(&input, &output, &KeepFilter::default(), &MonitorFields::default()).unwrap();

    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.removed.get(&StatusKey::NotFound), Some(&1));
    assert_eq!(outcome.kept.get(&StatusKey::Other), Some(&1));
    let entries = codes(&output);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["code"].as_str(), Some("PEKI202506020001"));
    assert!(entries.iter().all(|entry| !entry.contains_key("channel")));
}

#[test]
fn monitor_fields_make_email_entries() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("query_codes.csv");
    fs::write(&input, CHECKED).unwrap();
    let output = dir.path().join("codes.toml");
    let keep = KeepFilter::parse("gp").unwrap();
    let fields = MonitorFields::parse("target:you@example.com,freq_minutes:40").unwrap();

    let outcome = write_clean(&input, &output, &keep, &fields).unwrap();

    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.removed_total(), 2);
    for entry in codes(&output) {
        assert_eq!(entry["channel"].as_str(), Some("email"));
        assert_eq!(entry["target"].as_str(), Some("you@example.com"));
        assert_eq!(entry["freq_minutes"].as_integer(), Some(40));
    }
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let result = write_clean(
        &dir.path().join("absent.csv"),
        &dir.path().join("codes.toml"),
        &KeepFilter::default(),
        &MonitorFields::default(),
    );
    assert!(matches!(result, Err(CleanError::Io { .. })));
}

#[test]
fn default_output_sits_beside_input() {
    let path = default_output_path(
        std::path::Path::new("data/query_codes.csv"),
        datetime!(2025-06-02 08:30:05 UTC),
    );
    assert_eq!(path, std::path::Path::new("data/query_codes_cleaned_20250602_083005.toml"));
}
