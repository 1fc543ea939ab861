// crates/visa-monitor-core/src/interfaces/mod.rs
// ============================================================================
// Module: Visa Monitor Interfaces
// Description: Backend-agnostic seams for portal access, storage, and mail.
// Purpose: Define the contract surfaces the runtime drives.
// Dependencies: crate::core, async-trait
// ============================================================================

//! ## Overview
//! Interfaces keep the scheduler independent of the portal transport, the
//! on-disk format, and the SMTP stack. Runtime code composes them; tests
//! substitute scripted implementations.
//!
//! Implementations consume untrusted portal pages and user-supplied
//! addresses and must fail closed: an unreadable page is an error, never a
//! guessed status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::QueryCode;
use crate::core::QueryType;
use crate::core::StatusSnapshot;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Query Executor
// ============================================================================

/// Result text read from the portal, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatusText(pub String);

impl RawStatusText {
    /// Returns the raw text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Portal execution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - None of them are fatal; exhausted retries become `QueryFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Network failure or timeout.
    #[error("portal transient error: {0}")]
    Transient(String),
    /// Page loaded but the expected element was not present.
    #[error("portal element missing: {0}")]
    ElementMissing(String),
    /// The cycle was cancelled while the check was in flight.
    #[error("portal check cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Returns true when another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Portal executor with separately gated phases.
///
/// The dispatcher limits `navigate` and `fill_and_read` with independent
/// permits, so executors expose the two phases rather than one opaque call.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Shared per-cycle execution context (a browser or HTTP client).
    type Context: Send + Sync;
    /// Loaded page handle passed from navigation to form submission.
    type Page: Send;

    /// Opens the context shared by every check in one cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the context cannot be created.
    async fn open_context(&self) -> Result<Self::Context, ExecutionError>;

    /// Loads the portal form for `query_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the page cannot be loaded.
    async fn navigate(
        &self,
        context: &Self::Context,
        query_type: QueryType,
    ) -> Result<Self::Page, ExecutionError>;

    /// Submits `code` on `page` and reads the result text.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when submission fails or no result is shown.
    async fn fill_and_read(
        &self,
        context: &Self::Context,
        page: Self::Page,
        code: &QueryCode,
    ) -> Result<RawStatusText, ExecutionError>;

    /// Releases the context. Must not fail.
    async fn close_context(&self, context: Self::Context);

    /// Runs both phases for one code.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] from either phase.
    async fn execute(
        &self,
        code: &QueryCode,
        query_type: QueryType,
        context: &Self::Context,
    ) -> Result<RawStatusText, ExecutionError> {
        let page = self.navigate(context, query_type).await?;
        self.fill_and_read(context, page, code).await
    }
}

// ============================================================================
// SECTION: Snapshot Store
// ============================================================================

/// Snapshot store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("status store io error: {0}")]
    Io(String),
    /// Both the primary file and its backup are unreadable.
    #[error("status store corruption: {0}")]
    Corrupt(String),
    /// Store data is invalid.
    #[error("status store invalid data: {0}")]
    Invalid(String),
    /// Document could not be serialized.
    #[error("status store serialization error: {0}")]
    Serialization(String),
}

/// Persistent map of per-code snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Loads every snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when stored state is unreadable.
    fn load_all(&self) -> Result<BTreeMap<QueryCode, StatusSnapshot>, StoreError>;

    /// Replaces the whole snapshot map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_all(
        &self,
        items: &BTreeMap<QueryCode, StatusSnapshot>,
        generated_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Writes one snapshot, leaving the others untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read-modify-write fails.
    fn update(&self, snapshot: &StatusSnapshot, generated_at: Timestamp) -> Result<(), StoreError> {
        let mut items = self.load_all()?;
        items.insert(snapshot.code.clone(), snapshot.clone());
        self.save_all(&items, generated_at)
    }
}

// ============================================================================
// SECTION: Mail Transport
// ============================================================================

/// Rendered email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html_body: String,
}

/// Mail transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// Address or message could not be built.
    #[error("mail build error: {0}")]
    Build(String),
    /// Relay refused or connection failed.
    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Outbound mail transport.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Sends one email.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] when delivery fails.
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}
