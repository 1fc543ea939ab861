// crates/visa-monitor-core/src/core/status.rs
// ============================================================================
// Module: Visa Monitor Normalized Status
// Description: Closed status vocabulary shared by tracker, store, and emails.
// Purpose: Give every portal reading a stable, comparable, bilingual value.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`NormalizedStatus`] is the only status shape the rest of the system sees.
//! Raw portal text is mapped onto it by the normalizer; `QueryFailed` is added
//! by the pipeline when a check exhausts its retry budget.
//!
//! ## Invariants
//! - Persisted form is the bilingual display label (for example
//!   `"Proceedings / 审理中"`), so status files stay human readable.
//! - [`NormalizedStatus::from_label`] accepts every label emitted by
//!   [`NormalizedStatus::label`] plus the bare English and Chinese halves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Normalized portal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NormalizedStatus {
    /// Application granted.
    Granted,
    /// Application rejected or proceedings closed.
    RejectedClosed,
    /// Application still under review.
    Proceedings,
    /// Portal does not know the code.
    NotFound,
    /// Page text matched no rule.
    Unknown,
    /// Check failed after the retry budget was exhausted.
    QueryFailed,
}

impl NormalizedStatus {
    /// All statuses in report display order.
    pub const ALL: [Self; 6] = [
        Self::Granted,
        Self::RejectedClosed,
        Self::Proceedings,
        Self::NotFound,
        Self::Unknown,
        Self::QueryFailed,
    ];

    /// Returns the bilingual display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Granted => "Granted / 已通过",
            Self::RejectedClosed => "Rejected/Closed / 被拒绝/已关闭",
            Self::Proceedings => "Proceedings / 审理中",
            Self::NotFound => "Not Found / 未找到",
            Self::Unknown => "Unknown / 未知",
            Self::QueryFailed => "Query Failed / 查询失败",
        }
    }

    /// Returns the English half of the label.
    #[must_use]
    pub const fn english(self) -> &'static str {
        match self {
            Self::Granted => "Granted",
            Self::RejectedClosed => "Rejected/Closed",
            Self::Proceedings => "Proceedings",
            Self::NotFound => "Not Found",
            Self::Unknown => "Unknown",
            Self::QueryFailed => "Query Failed",
        }
    }

    /// Returns the Chinese half of the label.
    #[must_use]
    pub const fn chinese(self) -> &'static str {
        match self {
            Self::Granted => "已通过",
            Self::RejectedClosed => "被拒绝/已关闭",
            Self::Proceedings => "审理中",
            Self::NotFound => "未找到",
            Self::Unknown => "未知",
            Self::QueryFailed => "查询失败",
        }
    }

    /// Returns true for readings that may become a last known valid status.
    #[must_use]
    pub const fn is_valid_reading(self) -> bool {
        !matches!(self, Self::QueryFailed)
    }

    /// Returns true when the code needs no further polling.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Parses a label produced by [`Self::label`], or either of its halves.
    ///
    /// Matching ignores ASCII case and surrounding whitespace.
    #[must_use]
    pub fn from_label(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|status| {
            trimmed.eq_ignore_ascii_case(status.label())
                || trimmed.eq_ignore_ascii_case(status.english())
                || trimmed == status.chinese()
        })
    }
}

impl fmt::Display for NormalizedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for NormalizedStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for NormalizedStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_label(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown status label: {raw}")))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_back() {
        for status in NormalizedStatus::ALL {
            assert_eq!(NormalizedStatus::from_label(status.label()), Some(status));
            assert_eq!(NormalizedStatus::from_label(status.english()), Some(status));
            assert_eq!(NormalizedStatus::from_label(status.chinese()), Some(status));
        }
    }

    #[test]
    fn from_label_rejects_unknown_text() {
        assert_eq!(NormalizedStatus::from_label(""), None);
        assert_eq!(NormalizedStatus::from_label("Pending/等待查询"), None);
    }

    #[test]
    fn query_failed_is_not_a_valid_reading() {
        assert!(!NormalizedStatus::QueryFailed.is_valid_reading());
        assert!(NormalizedStatus::Unknown.is_valid_reading());
    }
}
