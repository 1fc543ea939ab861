// crates/visa-monitor-core/src/core/identifiers.rs
// ============================================================================
// Module: Visa Monitor Identifiers
// Description: Query codes, portal variants, and notification channels.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`QueryCode`] is the applicant identifier typed into the portal form. Its
//! accepted format depends on the [`QueryType`] variant, so validation lives on
//! the variant rather than the code. Codes are stored upper-cased and trimmed;
//! the wire form is the plain string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Letter prefix length for residence-permit portal codes.
const CZ_PREFIX_LEN: usize = 4;
/// Digit suffix length for residence-permit portal codes.
const CZ_DIGITS_LEN: usize = 12;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Applicant code submitted to the status portal.
///
/// # Invariants
/// - Trimmed and ASCII upper-cased at construction.
/// - Format validation is performed by [`QueryType::validate_code`], not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryCode(String);

impl QueryCode {
    /// Creates a new query code, normalizing whitespace and case.
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueryCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Portal sub-form a code is checked against.
///
/// # Invariants
/// - Closed set; adding a portal means adding a variant and an executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Czech residence-permit and long-stay visa status lookup.
    #[default]
    CzResidence,
}

impl QueryType {
    /// Returns the stable label for this variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CzResidence => "cz_residence",
        }
    }

    /// Returns the portal form field that receives the code.
    #[must_use]
    pub const fn form_field(self) -> &'static str {
        match self {
            Self::CzResidence => "visaApplicationNumber",
        }
    }

    /// Validates that `code` matches this portal's expected format.
    ///
    /// # Errors
    ///
    /// Returns [`CodeFormatError`] when the code does not match.
    pub fn validate_code(self, code: &QueryCode) -> Result<(), CodeFormatError> {
        match self {
            Self::CzResidence => validate_cz_code(code.as_str()),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound notification channel.
///
/// # Invariants
/// - Absence of a channel (`Option::None` on the tracked code) disables notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email delivery through the pooled SMTP transport.
    Email,
}

impl Channel {
    /// Parses a channel label. Empty input yields `Ok(None)` (disabled).
    ///
    /// # Errors
    ///
    /// Returns the rejected label when it names an unsupported channel.
    pub fn parse(value: &str) -> Result<Option<Self>, String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if trimmed.eq_ignore_ascii_case("email") {
            return Ok(Some(Self::Email));
        }
        Err(trimmed.to_string())
    }

    /// Returns the stable label for this channel.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
        }
    }
}

/// Where a tracked code was declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeOrigin {
    /// Declared in the configuration file.
    #[default]
    Config,
    /// Registered through the self-service web flow.
    User,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Code format validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid code format for {query_type}: {code}")]
pub struct CodeFormatError {
    /// Portal variant the code was validated against.
    pub query_type: QueryType,
    /// Offending code.
    pub code: String,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Checks the `AAAA000000000000` shape used by the residence-permit portal.
fn validate_cz_code(code: &str) -> Result<(), CodeFormatError> {
    let bytes = code.as_bytes();
    let well_formed = bytes.len() == CZ_PREFIX_LEN + CZ_DIGITS_LEN
        && bytes[.. CZ_PREFIX_LEN].iter().all(u8::is_ascii_uppercase)
        && bytes[CZ_PREFIX_LEN ..].iter().all(u8::is_ascii_digit);
    if well_formed {
        Ok(())
    } else {
        Err(CodeFormatError {
            query_type: QueryType::CzResidence,
            code: code.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_code_normalizes_case_and_whitespace() {
        let code = QueryCode::new("  peki202506020001 ");
        assert_eq!(code.as_str(), "PEKI202506020001");
    }

    #[test]
    fn cz_format_accepts_expected_shape() {
        let ok = QueryCode::new("PEKI202506020001");
        assert!(QueryType::CzResidence.validate_code(&ok).is_ok());
    }

    #[test]
    fn cz_format_rejects_wrong_shapes() {
        for raw in ["PEK202506020001", "PEKI20250602000", "PEKI2025060200011", "PEK1202506020001"]
        {
            let code = QueryCode::new(raw);
            assert!(QueryType::CzResidence.validate_code(&code).is_err(), "{raw}");
        }
    }

    #[test]
    fn channel_parse_treats_empty_as_disabled() {
        assert_eq!(Channel::parse("  "), Ok(None));
        assert_eq!(Channel::parse("Email"), Ok(Some(Channel::Email)));
        assert!(Channel::parse("sms").is_err());
    }
}
