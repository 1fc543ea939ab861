// crates/visa-monitor-store/src/users.rs
// ============================================================================
// Module: Users Registry
// Description: Self-service registrations, sessions, and verification codes.
// Purpose: Persist email-verified user codes alongside short-lived credentials.
// Dependencies: crate::atomic, visa-monitor-core, serde, serde_json, subtle
// ============================================================================

//! ## Overview
//! `users.json` holds everything the self-service API owns: verified user
//! codes, login sessions, one-time management codes, and pending additions
//! awaiting email confirmation. The document is mutated in memory through
//! the methods on [`UsersDocument`] and saved atomically by [`UsersStore`].
//!
//! ## Invariants
//! - Every mutation takes the current time from the caller.
//! - Expired credentials are never honored, even before a purge removes them.
//! - The registry never contains two codes with the same value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::Duration;
use visa_monitor_core::Channel;
use visa_monitor_core::CodeOrigin;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryType;
use visa_monitor_core::StoreError;
use visa_monitor_core::Timestamp;
use visa_monitor_core::TrackedCode;

use crate::atomic::AtomicFile;
use crate::atomic::Loaded;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session lifetime.
pub const SESSION_TTL: Duration = Duration::days(7);
/// Management verification code lifetime.
pub const VERIFICATION_TTL: Duration = Duration::minutes(10);
/// Pending addition lifetime.
pub const PENDING_TTL: Duration = Duration::minutes(10);

// ============================================================================
// SECTION: Records
// ============================================================================

/// Verified user code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCodeRecord {
    /// Applicant code.
    pub code: QueryCode,
    /// Notification channel.
    pub channel: Channel,
    /// Notification address; also the owner identity.
    pub target: String,
    /// Optional frequency; `None` uses the default.
    #[serde(default)]
    pub freq_minutes: Option<u32>,
    /// Optional note.
    #[serde(default)]
    pub note: Option<String>,
    /// Portal variant.
    #[serde(default)]
    pub query_type: QueryType,
    /// Verification time.
    pub added_at: Timestamp,
}

impl UserCodeRecord {
    /// Converts the record into a tracked code.
    #[must_use]
    pub fn to_tracked(&self) -> TrackedCode {
        TrackedCode {
            code: self.code.clone(),
            channel: Some(self.channel),
            target: Some(self.target.clone()),
            freq_minutes: self.freq_minutes,
            note: self.note.clone(),
            query_type: self.query_type,
            origin: CodeOrigin::User,
        }
    }
}

/// Login session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Owner email.
    pub email: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Last successful use.
    pub last_used: Timestamp,
}

/// Purpose of a one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    /// Listing and deleting codes.
    Manage,
}

/// One-time email verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Six-digit code.
    pub code: String,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Purpose of the code.
    #[serde(rename = "type")]
    pub purpose: VerificationPurpose,
}

/// Registration awaiting email confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAddition {
    /// Requested code.
    pub code: QueryCode,
    /// Requesting email.
    pub email: String,
    /// Expiry time.
    pub expires_at: Timestamp,
}

/// Counts removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    /// Expired sessions removed.
    pub sessions: usize,
    /// Expired verification codes removed.
    pub verification_codes: usize,
    /// Expired pending additions removed.
    pub pending_additions: usize,
}

impl PurgeCounts {
    /// Returns the total number of removed entries.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.sessions + self.verification_codes + self.pending_additions
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Token, session, or code not present.
    #[error("registry entry not found")]
    NotFound,
    /// Credential present but expired.
    #[error("registry entry expired")]
    Expired,
    /// Code already registered; carries the existing owner address.
    #[error("code already registered")]
    Duplicate(String),
    /// Supplied verification code did not match.
    #[error("verification code mismatch")]
    Mismatch,
}

// ============================================================================
// SECTION: Document
// ============================================================================

/// Whole-file users document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersDocument {
    /// Time the document was written.
    #[serde(default)]
    pub generated_at: Option<Timestamp>,
    /// Verified user codes.
    #[serde(default)]
    pub codes: Vec<UserCodeRecord>,
    /// Sessions keyed by session id.
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionRecord>,
    /// Verification codes keyed by normalized email.
    #[serde(default)]
    pub verification_codes: BTreeMap<String, VerificationRecord>,
    /// Pending additions keyed by confirmation token.
    #[serde(default)]
    pub pending_additions: BTreeMap<String, PendingAddition>,
}

impl UsersDocument {
    /// Returns the registered record for `code`.
    #[must_use]
    pub fn find_code(&self, code: &QueryCode) -> Option<&UserCodeRecord> {
        self.codes.iter().find(|record| &record.code == code)
    }

    /// Returns every code owned by `email`.
    #[must_use]
    pub fn codes_for(&self, email: &str) -> Vec<&UserCodeRecord> {
        let email = normalize_email(email);
        self.codes.iter().filter(|record| normalize_email(&record.target) == email).collect()
    }

    /// Returns the user codes as tracked codes.
    #[must_use]
    pub fn tracked_codes(&self) -> Vec<TrackedCode> {
        self.codes.iter().map(UserCodeRecord::to_tracked).collect()
    }

    /// Records a pending addition under `token`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the code is already registered.
    pub fn begin_addition(
        &mut self,
        token: String,
        code: QueryCode,
        email: &str,
        now: Timestamp,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.find_code(&code) {
            return Err(RegistryError::Duplicate(existing.target.clone()));
        }
        self.pending_additions.insert(
            token,
            PendingAddition {
                code,
                email: normalize_email(email),
                expires_at: now.plus(PENDING_TTL),
            },
        );
        Ok(())
    }

    /// Confirms the pending addition under `token`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the token is unknown or expired, or the
    /// code was registered in the meantime.
    pub fn complete_addition(
        &mut self,
        token: &str,
        now: Timestamp,
    ) -> Result<UserCodeRecord, RegistryError> {
        let pending = self.pending_additions.remove(token).ok_or(RegistryError::NotFound)?;
        if pending.expires_at <= now {
            return Err(RegistryError::Expired);
        }
        if let Some(existing) = self.find_code(&pending.code) {
            return Err(RegistryError::Duplicate(existing.target.clone()));
        }
        let record = UserCodeRecord {
            code: pending.code,
            channel: Channel::Email,
            target: pending.email,
            freq_minutes: None,
            note: None,
            query_type: QueryType::default(),
            added_at: now,
        };
        self.codes.push(record.clone());
        Ok(record)
    }

    /// Stores a management code for `email`, replacing any previous one.
    pub fn issue_verification(&mut self, email: &str, code: String, now: Timestamp) {
        self.verification_codes.insert(
            normalize_email(email),
            VerificationRecord {
                code,
                expires_at: now.plus(VERIFICATION_TTL),
                purpose: VerificationPurpose::Manage,
            },
        );
    }

    /// Consumes a management code.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when no code is stored, it expired, or it
    /// does not match. A mismatch leaves the stored code in place.
    pub fn consume_verification(
        &mut self,
        email: &str,
        code: &str,
        now: Timestamp,
    ) -> Result<(), RegistryError> {
        let key = normalize_email(email);
        let record = self.verification_codes.get(&key).ok_or(RegistryError::NotFound)?;
        if record.expires_at <= now {
            self.verification_codes.remove(&key);
            return Err(RegistryError::Expired);
        }
        let matches: bool = record.code.as_bytes().ct_eq(code.trim().as_bytes()).into();
        if !matches {
            return Err(RegistryError::Mismatch);
        }
        self.verification_codes.remove(&key);
        Ok(())
    }

    /// Creates a session for `email` under `session_id`.
    pub fn create_session(&mut self, session_id: String, email: &str, now: Timestamp) {
        self.sessions.insert(
            session_id,
            SessionRecord {
                email: normalize_email(email),
                created_at: now,
                expires_at: now.plus(SESSION_TTL),
                last_used: now,
            },
        );
    }

    /// Validates a session and marks it used; returns the owner email.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the session is unknown or expired.
    pub fn touch_session(&mut self, session_id: &str, now: Timestamp) -> Result<String, RegistryError> {
        let session = self.sessions.get_mut(session_id).ok_or(RegistryError::NotFound)?;
        if session.expires_at <= now {
            self.sessions.remove(session_id);
            return Err(RegistryError::Expired);
        }
        session.last_used = now;
        Ok(session.email.clone())
    }

    /// Removes a session. Returns true when it existed.
    pub fn remove_session(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Removes `code` when owned by `email`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when the code is absent or owned
    /// by someone else.
    pub fn remove_code(&mut self, code: &QueryCode, email: &str) -> Result<UserCodeRecord, RegistryError> {
        let email = normalize_email(email);
        let index = self
            .codes
            .iter()
            .position(|record| &record.code == code && normalize_email(&record.target) == email)
            .ok_or(RegistryError::NotFound)?;
        Ok(self.codes.remove(index))
    }

    /// Drops every expired credential.
    pub fn purge_expired(&mut self, now: Timestamp) -> PurgeCounts {
        let before = (self.sessions.len(), self.verification_codes.len(), self.pending_additions.len());
        self.sessions.retain(|_, session| session.expires_at > now);
        self.verification_codes.retain(|_, record| record.expires_at > now);
        self.pending_additions.retain(|_, pending| pending.expires_at > now);
        PurgeCounts {
            sessions: before.0 - self.sessions.len(),
            verification_codes: before.1 - self.verification_codes.len(),
            pending_additions: before.2 - self.pending_additions.len(),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// File-backed users registry.
#[derive(Debug, Clone)]
pub struct UsersStore {
    /// Atomic file handle for `users.json`.
    file: AtomicFile,
}

impl UsersStore {
    /// Creates a store writing to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `path` has no file name.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            file: AtomicFile::new(path)?,
        })
    }

    /// Loads the document with provenance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when neither the file nor its backup
    /// parses.
    pub fn load_document(&self) -> Result<Loaded<UsersDocument>, StoreError> {
        self.file.load(|bytes| {
            serde_json::from_slice::<UsersDocument>(bytes).map_err(|err| err.to_string())
        })
    }

    /// Loads the document, defaulting to empty on a fresh start.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when stored state is unreadable.
    pub fn load(&self) -> Result<UsersDocument, StoreError> {
        Ok(self.load_document()?.value.unwrap_or_default())
    }

    /// Writes the document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the write fails.
    pub fn save(&self, document: &mut UsersDocument, now: Timestamp) -> Result<(), StoreError> {
        document.generated_at = Some(now);
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        self.file.write(&bytes)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Lower-cases and trims an email for comparison and keys.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Masks an address as `abc***@domain` for duplicate-code messages.
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(3).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_email_keeps_prefix_and_domain() {
        assert_eq!(mask_email("alice@example.com"), "ali***@example.com");
        assert_eq!(mask_email("al@example.com"), "al***@example.com");
        assert_eq!(mask_email("nope"), "***");
    }
}
