// crates/visa-monitor-store/tests/users.rs
// ============================================================================
// Module: Users Registry Tests
// Description: Registration, verification, session, and purge flows.
// Purpose: Ensure expired credentials are never honored and codes stay unique.
// Dependencies: visa-monitor-store, visa-monitor-core, tempfile
// ============================================================================

//! ## Overview
//! Drives [`UsersDocument`] through the self-service lifecycle with an
//! injected clock and persists it through [`UsersStore`].

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

use tempfile::TempDir;
use time::Duration;
use visa_monitor_core::CodeOrigin;
use visa_monitor_core::QueryCode;
use visa_monitor_core::Timestamp;
use visa_monitor_store::RegistryError;
use visa_monitor_store::UsersDocument;
use visa_monitor_store::UsersStore;

fn t0() -> Timestamp {
    Timestamp::from_unix_millis(1_750_000_000_000).unwrap()
}

fn code() -> QueryCode {
    QueryCode::new("PEKI202506020001")
}

#[test]
fn addition_moves_into_codes_after_confirmation() {
    let mut doc = UsersDocument::default();
    doc.begin_addition("tok".to_string(), code(), " Alice@Example.com ", t0()).unwrap();
    let record = doc.complete_addition("tok", t0().plus(Duration::minutes(5))).unwrap();

    assert_eq!(record.target, "alice@example.com");
    assert!(doc.pending_additions.is_empty());
    assert_eq!(doc.codes_for("ALICE@example.com").len(), 1);
    let tracked = doc.tracked_codes();
    assert_eq!(tracked[0].origin, CodeOrigin::User);
    assert_eq!(tracked[0].target.as_deref(), Some("alice@example.com"));
}

#[test]
fn expired_addition_is_rejected_and_dropped() {
    let mut doc = UsersDocument::default();
    doc.begin_addition("tok".to_string(), code(), "a@example.com", t0()).unwrap();
    let result = doc.complete_addition("tok", t0().plus(Duration::minutes(10)));
    assert_eq!(result, Err(RegistryError::Expired));
    assert!(doc.codes.is_empty());
    assert_eq!(doc.complete_addition("tok", t0()), Err(RegistryError::NotFound));
}

#[test]
fn duplicate_code_is_rejected_with_owner() {
    let mut doc = UsersDocument::default();
    doc.begin_addition("one".to_string(), code(), "a@example.com", t0()).unwrap();
    doc.complete_addition("one", t0()).unwrap();
    let result = doc.begin_addition("two".to_string(), code(), "b@example.com", t0());
    assert_eq!(result, Err(RegistryError::Duplicate("a@example.com".to_string())));
}

#[test]
fn racing_confirmations_register_once() {
    let mut doc = UsersDocument::default();
    doc.begin_addition("one".to_string(), code(), "a@example.com", t0()).unwrap();
    doc.begin_addition("two".to_string(), code(), "b@example.com", t0()).unwrap();
    doc.complete_addition("one", t0()).unwrap();
    assert!(matches!(doc.complete_addition("two", t0()), Err(RegistryError::Duplicate(_))));
    assert_eq!(doc.codes.len(), 1);
}

#[test]
fn verification_code_is_single_use() {
    let mut doc = UsersDocument::default();
    doc.issue_verification("a@example.com", "123456".to_string(), t0());
    assert_eq!(
        doc.consume_verification("a@example.com", "000000", t0()),
        Err(RegistryError::Mismatch)
    );
    doc.consume_verification("A@example.com", "123456", t0()).unwrap();
    assert_eq!(
        doc.consume_verification("a@example.com", "123456", t0()),
        Err(RegistryError::NotFound)
    );
}

#[test]
fn expired_verification_code_is_refused() {
    let mut doc = UsersDocument::default();
    doc.issue_verification("a@example.com", "123456".to_string(), t0());
    let late = t0().plus(Duration::minutes(11));
    assert_eq!(doc.consume_verification("a@example.com", "123456", late), Err(RegistryError::Expired));
}

#[test]
fn sessions_expire_after_seven_days() {
    let mut doc = UsersDocument::default();
    doc.create_session("sid".to_string(), "a@example.com", t0());
    assert_eq!(doc.touch_session("sid", t0().plus(Duration::days(6))).unwrap(), "a@example.com");
    assert_eq!(doc.touch_session("sid", t0().plus(Duration::days(7))), Err(RegistryError::Expired));
    assert!(doc.sessions.is_empty());
}

#[test]
fn remove_code_requires_owner() {
    let mut doc = UsersDocument::default();
    doc.begin_addition("tok".to_string(), code(), "a@example.com", t0()).unwrap();
    doc.complete_addition("tok", t0()).unwrap();
    assert_eq!(doc.remove_code(&code(), "b@example.com"), Err(RegistryError::NotFound));
    doc.remove_code(&code(), "a@example.com").unwrap();
    assert!(doc.codes.is_empty());
}

#[test]
fn purge_drops_only_expired_entries() {
    let mut doc = UsersDocument::default();
    doc.create_session("old".to_string(), "a@example.com", t0());
    doc.issue_verification("a@example.com", "123456".to_string(), t0());
    doc.begin_addition("tok".to_string(), code(), "a@example.com", t0()).unwrap();
    let later = t0().plus(Duration::minutes(30));
    doc.create_session("new".to_string(), "b@example.com", later);

    let counts = doc.purge_expired(later);
    assert_eq!(counts.sessions, 0);
    assert_eq!(counts.verification_codes, 1);
    assert_eq!(counts.pending_additions, 1);
    assert_eq!(counts.total(), 2);
    assert_eq!(doc.sessions.len(), 2);
}

#[test]
fn store_round_trips_through_disk() {
    let temp = TempDir::new().unwrap();
    let store = UsersStore::new(&temp.path().join("config").join("users.json")).unwrap();
    assert_eq!(store.load().unwrap(), UsersDocument::default());

    let mut doc = UsersDocument::default();
    doc.begin_addition("tok".to_string(), code(), "a@example.com", t0()).unwrap();
    doc.complete_addition("tok", t0()).unwrap();
    doc.create_session("sid".to_string(), "a@example.com", t0());
    store.save(&mut doc, t0()).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, doc);
    assert_eq!(loaded.generated_at, Some(t0()));
}
