// crates/visa-monitor-store/tests/failures.rs
// ============================================================================
// Module: Failure Export Tests
// Description: Daily CSV append behavior and batch counters.
// Purpose: Ensure exports carry one header and cross-run counts.
// Dependencies: visa-monitor-store, visa-monitor-core, tempfile
// ============================================================================

//! ## Overview
//! Appends failure rows to a temporary log directory and reads them back.

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
use time::macros::date;
use visa_monitor_core::QueryCode;
use visa_monitor_store::CountersStore;
use visa_monitor_store::CsvTable;
use visa_monitor_store::FailureLog;
use visa_monitor_store::FailureRecord;

fn record(code: &str, count: u32) -> FailureRecord {
    FailureRecord {
        date: "2025-06-02".to_string(),
        code: QueryCode::new(code),
        status: "Query Failed / 查询失败".to_string(),
        remark: "timeout, retry exhausted".to_string(),
        consecutive_failures: count,
    }
}

#[test]
fn export_writes_header_once_and_appends_rows() {
    let temp = TempDir::new().unwrap();
    let log = FailureLog::new(temp.path().join("fails"));
    let day = date!(2025 - 06 - 02);
    log.append(day, &record("PEKI202506020001", 1)).unwrap();
    let path = log.append(day, &record("PEKI202506020001", 2)).unwrap();

    let table = CsvTable::parse(&fs::read_to_string(path).unwrap());
    assert_eq!(
        table.headers,
        vec!["日期/Date", "查询码/Code", "状态/Status", "备注/Remark", "连续失败/ConsecutiveFailures"]
    );
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1][3], "timeout, retry exhausted");
    assert_eq!(table.rows[1][4], "2");
}

#[test]
fn counters_persist_across_runs() {
    let temp = TempDir::new().unwrap();
    let code = QueryCode::new("PEKI202506020001");
    let store = CountersStore::in_dir(&temp.path().join("fails")).unwrap();

    let mut counters = store.load().unwrap();
    assert_eq!(counters.record_failure(&code), 1);
    store.save(&counters).unwrap();

    let mut reloaded = CountersStore::in_dir(&temp.path().join("fails")).unwrap().load().unwrap();
    assert_eq!(reloaded.record_failure(&code), 2);
    reloaded.record_success(&code);
    assert_eq!(reloaded.get(&code), 0);
}
