// crates/visa-monitor-runtime/src/portal.rs
// ============================================================================
// Module: Portal Executor
// Description: HTTP implementation of the query executor contract.
// Purpose: Load the status form, submit a code, and read the result banner.
// Dependencies: crate::html, reqwest, url, visa-monitor-core
// ============================================================================

//! ## Overview
//! The executor's context is one `reqwest::Client` shared by every check in
//! a cycle. Navigation fetches the form page and captures its action, its
//! hidden fields, and the session cookies the page set; fill/read posts the
//! code with those cookies and extracts the first non-empty result
//! container. Cookies live in a per-check jar so concurrent checks never
//! trade sessions. Redirects are limited and responses are size-capped.
//! Portal pages are untrusted input: an unreadable page is an error, never a
//! guessed status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Response;
use reqwest::cookie::CookieStore;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::COOKIE;
use reqwest::header::HeaderValue;
use reqwest::header::SET_COOKIE;
use reqwest::redirect::Policy;
use url::Url;
use url::form_urlencoded::Serializer;
use visa_monitor_config::PortalConfig;
use visa_monitor_core::ExecutionError;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::QueryType;
use visa_monitor_core::RawStatusText;

use crate::error::RuntimeError;
use crate::html::extract_result_text;
use crate::html::form_for_input;
use crate::html::has_input;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted page size.
pub const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;
/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 5;
/// Default user agent.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) visa-monitor/0.1";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Portal connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSettings {
    /// Status page URL.
    pub url: Url,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout.
    pub request_timeout: Duration,
    /// User agent header.
    pub user_agent: String,
}

impl PortalSettings {
    /// Builds settings from the portal config section.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] when the URL is invalid.
    pub fn from_config(config: &PortalConfig) -> Result<Self, RuntimeError> {
        let url = Url::parse(config.url.trim())
            .map_err(|err| RuntimeError::Config(format!("portal.url: {err}")))?;
        Ok(Self {
            url,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            user_agent: config.user_agent.clone().unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        })
    }
}

/// Loaded status form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalForm {
    /// Submission URL.
    pub action: Url,
    /// Code field name.
    pub field: &'static str,
    /// Hidden fields to echo back.
    pub hidden: Vec<(String, String)>,
    /// Cookies the form page set, scoped to `action`.
    pub cookies: Option<HeaderValue>,
}

/// HTTP portal executor.
///
/// Clones share one settings slot, so [`PortalExecutor::update`] reaches
/// every holder. Updates apply from the next opened context.
#[derive(Debug, Clone)]
pub struct PortalExecutor {
    /// Connection settings.
    settings: Arc<RwLock<PortalSettings>>,
}

impl PortalExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(settings: PortalSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    /// Returns the settings in effect.
    #[must_use]
    pub fn settings(&self) -> PortalSettings {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the settings.
    pub fn update(&self, settings: PortalSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Returns the status page URL for `query_type`.
    fn page_url(&self, query_type: QueryType) -> Url {
        match query_type {
            QueryType::CzResidence => self.settings().url,
        }
    }
}

#[async_trait]
impl QueryExecutor for PortalExecutor {
    type Context = Client;
    type Page = PortalForm;

    async fn open_context(&self) -> Result<Client, ExecutionError> {
        let settings = self.settings();
        Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|err| ExecutionError::Transient(format!("http client: {err}")))
    }

    async fn navigate(
        &self,
        context: &Client,
        query_type: QueryType,
    ) -> Result<PortalForm, ExecutionError> {
        let url = self.page_url(query_type);
        let response = send_checked(context.get(url.clone())).await?;
        let jar = Jar::default();
        jar.set_cookies(&mut response.headers().get_all(SET_COOKIE).iter(), response.url());
        let body = read_text(response).await?;
        let field = query_type.form_field();
        if !has_input(&body, field) {
            return Err(ExecutionError::ElementMissing(format!("input {field}")));
        }
        let (action, hidden) = form_for_input(&body, field).unwrap_or((None, Vec::new()));
        let action = match action.filter(|value| !value.trim().is_empty()) {
            Some(action) => url
                .join(action.trim())
                .map_err(|err| ExecutionError::ElementMissing(format!("form action: {err}")))?,
            None => url,
        };
        let cookies = jar.cookies(&action);
        Ok(PortalForm {
            action,
            field,
            hidden,
            cookies,
        })
    }

    async fn fill_and_read(
        &self,
        context: &Client,
        page: PortalForm,
        code: &QueryCode,
    ) -> Result<RawStatusText, ExecutionError> {
        let encoded = {
            let mut form = Serializer::new(String::new());
            for (name, value) in &page.hidden {
                form.append_pair(name, value);
            }
            form.append_pair(page.field, code.as_str());
            form.finish()
        };
        let mut request = context
            .post(page.action)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encoded);
        if let Some(cookies) = page.cookies {
            request = request.header(COOKIE, cookies);
        }
        let body = read_text(send_checked(request).await?).await?;
        extract_result_text(&body)
            .map(RawStatusText)
            .ok_or_else(|| ExecutionError::ElementMissing("result text".to_string()))
    }

    async fn close_context(&self, context: Client) {
        drop(context);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Sends `request` and rejects non-success statuses.
async fn send_checked(request: reqwest::RequestBuilder) -> Result<Response, ExecutionError> {
    let response = request
        .send()
        .await
        .map_err(|err| ExecutionError::Transient(format!("request failed: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExecutionError::Transient(format!("http status {status}")));
    }
    Ok(response)
}

/// Returns the size-capped body text of `response`.
async fn read_text(response: Response) -> Result<String, ExecutionError> {
    if response.content_length().is_some_and(|len| len > MAX_PAGE_BYTES as u64) {
        return Err(ExecutionError::Transient("page too large".to_string()));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ExecutionError::Transient(format!("read body: {err}")))?;
    if bytes.len() > MAX_PAGE_BYTES {
        return Err(ExecutionError::Transient("page too large".to_string()));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
