// crates/visa-monitor-core/src/runtime/normalizer.rs
// ============================================================================
// Module: Visa Monitor Status Normalizer
// Description: Maps raw portal text onto the closed status vocabulary.
// Purpose: Turn free-form, possibly bilingual page text into a comparable value.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Normalization is a fixed, ordered list of case-insensitive substring rules;
//! the first matching rule wins. The function is total and pure, so the same
//! text always yields the same status.
//!
//! ## Invariants
//! - Never returns [`NormalizedStatus::QueryFailed`].
//! - "still ... proceedings" is checked before the bare "proceedings" rule,
//!   which otherwise indicates a closed case.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::NormalizedStatus;

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Markers for codes the portal does not know.
const NOT_FOUND_MARKERS: &[&str] = &["not found", "未找到"];
/// Marker for ongoing review in Chinese-language pages.
const PROCEEDINGS_MARKER_ZH: &str = "审理中";
/// Markers for a granted application.
const GRANTED_MARKERS: &[&str] =
    &["granted", "approved", "for information on how to proceed", "已通过"];
/// Markers for a rejected or closed application.
const REJECTED_MARKERS: &[&str] = &["proceedings", "rejected", "closed", "被拒绝", "已关闭"];

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes raw portal text.
#[must_use]
pub fn normalize(raw_text: &str) -> NormalizedStatus {
    let text = raw_text.trim().to_lowercase();
    if text.is_empty() {
        return NormalizedStatus::Unknown;
    }
    let contains_any = |markers: &[&str]| markers.iter().any(|marker| text.contains(marker));
    if contains_any(NOT_FOUND_MARKERS) {
        return NormalizedStatus::NotFound;
    }
    if (text.contains("still") && text.contains("proceedings"))
        || text.contains(PROCEEDINGS_MARKER_ZH)
    {
        return NormalizedStatus::Proceedings;
    }
    if contains_any(GRANTED_MARKERS) {
        return NormalizedStatus::Granted;
    }
    if contains_any(REJECTED_MARKERS) {
        return NormalizedStatus::RejectedClosed;
    }
    NormalizedStatus::Unknown
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_phrases_map_to_expected_statuses() {
        let cases = [
            ("", NormalizedStatus::Unknown),
            ("   ", NormalizedStatus::Unknown),
            ("Application not found.", NormalizedStatus::NotFound),
            ("The proceedings are still in progress", NormalizedStatus::Proceedings),
            ("申请审理中", NormalizedStatus::Proceedings),
            ("Your application was GRANTED", NormalizedStatus::Granted),
            (
                "For information on how to proceed, contact the office",
                NormalizedStatus::Granted,
            ),
            ("The proceedings were terminated", NormalizedStatus::RejectedClosed),
            ("Application rejected", NormalizedStatus::RejectedClosed),
            ("已关闭", NormalizedStatus::RejectedClosed),
            ("Something unexpected", NormalizedStatus::Unknown),
        ];
        for (text, expected) in cases {
            assert_eq!(normalize(text), expected, "{text}");
        }
    }

    #[test]
    fn not_found_wins_over_later_rules() {
        assert_eq!(normalize("granted record not found"), NormalizedStatus::NotFound);
    }
}
