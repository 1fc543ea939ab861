// crates/visa-monitor-core/tests/proptest_normalizer.rs
// ============================================================================
// Module: Normalizer Property-Based Tests
// Description: Property tests for status normalization.
// Purpose: Detect panics and nondeterminism across arbitrary page text.
// ============================================================================

//! Property-based tests for normalizer invariants.

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

use proptest::prelude::*;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::normalize;

proptest! {
    #[test]
    fn normalize_is_deterministic(text in ".*") {
        prop_assert_eq!(normalize(&text), normalize(&text));
    }

    #[test]
    fn normalize_never_reports_query_failed(text in ".*") {
        prop_assert_ne!(normalize(&text), NormalizedStatus::QueryFailed);
    }

    #[test]
    fn normalize_ignores_case_and_padding(text in "[a-zA-Z ]{0,40}") {
        let padded = format!("  {}\n", text.to_uppercase());
        prop_assert_eq!(normalize(&padded), normalize(&text.to_lowercase()));
    }

    #[test]
    fn not_found_marker_always_wins(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
        let text = format!("{prefix} not found {suffix}");
        prop_assert_eq!(normalize(&text), NormalizedStatus::NotFound);
    }
}
