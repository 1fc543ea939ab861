// crates/visa-monitor-store/tests/durability.rs
// ============================================================================
// Module: Atomic Store Durability Tests
// Description: Crash-window and corruption behavior of the status store.
// Purpose: Ensure interrupted writes never lose the previous state.
// Dependencies: visa-monitor-store, visa-monitor-core, tempfile
// ============================================================================

//! ## Overview
//! Simulates interrupted writes and damaged files on disk and checks that
//! loads recover from the backup or fail loudly.

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

use std::collections::BTreeMap;
use std::fs;

use tempfile::TempDir;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::StoreError;
use visa_monitor_core::Timestamp;
use visa_monitor_core::TrackedCode;
use visa_monitor_store::FileStatusStore;
use visa_monitor_store::LoadSource;

fn snapshot(code: &str, status: NormalizedStatus) -> StatusSnapshot {
    let tracked = TrackedCode::email(QueryCode::new(code), "a@example.com");
    let now = Timestamp::from_unix_millis(1_750_000_000_000).unwrap();
    let mut snapshot = StatusSnapshot::pending(&tracked, now);
    snapshot.status = Some(status);
    snapshot.last_checked = Some(now);
    snapshot.last_known_valid_status = Some(status);
    snapshot
}

fn items(entries: &[StatusSnapshot]) -> BTreeMap<QueryCode, StatusSnapshot> {
    entries.iter().map(|snapshot| (snapshot.code.clone(), snapshot.clone())).collect()
}

fn now() -> Timestamp {
    Timestamp::from_unix_millis(1_750_000_060_000).unwrap()
}

#[test]
fn fresh_directory_loads_empty() {
    let temp = TempDir::new().unwrap();
    let store = FileStatusStore::new(&temp.path().join("config").join("status.json")).unwrap();
    let loaded = store.load_document().unwrap();
    assert_eq!(loaded.source, LoadSource::Fresh);
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn save_creates_primary_and_backup() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config").join("status.json");
    let store = FileStatusStore::new(&path).unwrap();
    let entries = items(&[snapshot("PEKI202506020001", NormalizedStatus::Proceedings)]);
    store.save_all(&entries, now()).unwrap();

    assert!(path.exists());
    assert!(temp.path().join("config").join("status.json.bak").exists());
    assert_eq!(store.load_all().unwrap(), entries);
    let document: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert!(document.get("generated_at").is_some());
    assert_eq!(
        document["items"]["PEKI202506020001"]["status"],
        serde_json::Value::String("Proceedings / 审理中".to_string())
    );
}

#[test]
fn staged_temp_file_does_not_replace_previous_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    let store = FileStatusStore::new(&path).unwrap();
    let entries = items(&[snapshot("PEKI202506020001", NormalizedStatus::Proceedings)]);
    store.save_all(&entries, now()).unwrap();

    // Interrupted write: temp staged, never renamed.
    fs::write(temp.path().join(".tmp-status.json.4242.0"), b"{\"items\": {\"PEKI2025").unwrap();

    let loaded = store.load_document().unwrap();
    assert_eq!(loaded.source, LoadSource::Primary);
    assert_eq!(loaded.value.unwrap().items, entries);
}

#[test]
fn later_write_succeeds_despite_stray_temp_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    let store = FileStatusStore::new(&path).unwrap();
    fs::write(temp.path().join(".tmp-status.json.4242.0"), b"partial").unwrap();
    let entries = items(&[snapshot("PEKI202506020001", NormalizedStatus::Granted)]);
    store.save_all(&entries, now()).unwrap();
    assert_eq!(store.load_all().unwrap(), entries);
}

#[test]
fn corrupt_primary_falls_back_to_backup() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    let store = FileStatusStore::new(&path).unwrap();
    let entries = items(&[snapshot("PEKI202506020001", NormalizedStatus::Proceedings)]);
    store.save_all(&entries, now()).unwrap();
    fs::write(&path, b"{ not json").unwrap();

    let loaded = store.load_document().unwrap();
    assert_eq!(loaded.source, LoadSource::Backup);
    assert!(loaded.primary_error.is_some());
    assert_eq!(loaded.value.unwrap().items, entries);
}

#[test]
fn missing_primary_falls_back_to_backup() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    let store = FileStatusStore::new(&path).unwrap();
    let entries = items(&[snapshot("PEKI202506020001", NormalizedStatus::NotFound)]);
    store.save_all(&entries, now()).unwrap();
    fs::remove_file(&path).unwrap();

    let loaded = store.load_document().unwrap();
    assert_eq!(loaded.source, LoadSource::Backup);
    assert_eq!(loaded.value.unwrap().items, entries);
}

#[test]
fn both_copies_corrupt_fail_loudly() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    fs::write(&path, b"garbage").unwrap();
    fs::write(temp.path().join("status.json.bak"), b"also garbage").unwrap();
    let store = FileStatusStore::new(&path).unwrap();

    match store.load_all() {
        Err(StoreError::Corrupt(message)) => assert!(message.contains("status.json")),
        other => panic!("expected corrupt error, got {other:?}"),
    }
}

#[test]
fn corrupt_primary_without_backup_fails_loudly() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("status.json");
    fs::write(&path, b"garbage").unwrap();
    let store = FileStatusStore::new(&path).unwrap();
    assert!(matches!(store.load_all(), Err(StoreError::Corrupt(_))));
}

#[test]
fn per_code_update_preserves_other_codes() {
    let temp = TempDir::new().unwrap();
    let store = FileStatusStore::new(&temp.path().join("status.json")).unwrap();
    let first = snapshot("PEKI202506020001", NormalizedStatus::Proceedings);
    let second = snapshot("PEKI202506020002", NormalizedStatus::NotFound);
    store.save_all(&items(&[first.clone(), second]), now()).unwrap();

    let updated = snapshot("PEKI202506020002", NormalizedStatus::Granted);
    store.update(&updated, now()).unwrap();

    let loaded = store.load_all().unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.get(&first.code), Some(&first));
    assert_eq!(loaded.get(&updated.code).and_then(|item| item.status), Some(NormalizedStatus::Granted));
}
