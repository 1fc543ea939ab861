// crates/visa-monitor-runtime/src/server.rs
// ============================================================================
// Module: Self-Service API
// Description: axum routes for public status and user code management.
// Purpose: Let applicants register codes by email and manage them by session.
// Dependencies: axum, base64, rand, serde, serde_json, visa-monitor-*
// ============================================================================

//! ## Overview
//! The API reads `status.json` and reads and writes `users.json`; it never
//! writes scheduling state. Every mutation of the users registry runs under
//! one async lock as a load/modify/save through the atomic store. Email
//! ownership is proven by a link (adding a code) or a six-digit code
//! (managing codes); either yields a seven-day session.
//!
//! ## Invariants
//! - Per-IP sliding-window rate limit; loopback clients are exempt.
//! - Verification emails use the priority path and bypass the queue.
//! - Public status never exposes targets or channels.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::http::header::SET_COOKIE;
use axum::middleware;
use axum::middleware::Next;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::sleep;
use visa_monitor_config::ServerConfig;
use visa_monitor_config::looks_like_email;
use visa_monitor_core::CodeOrigin;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::PENDING_LABEL;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryType;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::Timestamp;
use visa_monitor_notify::Notifier;
use visa_monitor_notify::SlidingWindow;
use visa_monitor_notify::templates::escape_html;
use visa_monitor_notify::templates::management_code_email;
use visa_monitor_notify::templates::verification_email;
use visa_monitor_store::RegistryError;
use visa_monitor_store::UsersDocument;
use visa_monitor_store::users::mask_email;
use visa_monitor_store::users::normalize_email;

use crate::clock::Clock;
use crate::error::RuntimeError;
use crate::monitor::ControlMessage;
use crate::monitor::MonitorHandle;
use crate::state::StateStores;
use crate::state::load_users;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session cookie name.
pub const SESSION_COOKIE: &str = "visa_session_id";
/// Session cookie lifetime in seconds.
const SESSION_COOKIE_MAX_AGE: u64 = 7 * 24 * 3600;
/// Random bytes per confirmation token or session id.
const TOKEN_BYTES: usize = 32;
/// Seconds advertised in `Retry-After` on 429.
const RETRY_AFTER_SECS: &str = "60";

// ============================================================================
// SECTION: State
// ============================================================================

/// API limits and addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    /// Requests per client per minute; zero disables limiting.
    pub rate_limit_per_minute: u32,
    /// Base URL for links in emails.
    pub public_base_url: String,
    /// Maximum request body size.
    pub max_body_bytes: usize,
    /// Skip rate limiting for loopback clients.
    pub exempt_loopback: bool,
    /// Interval of the expired-credential sweep.
    pub cleanup_interval: Duration,
}

impl ApiSettings {
    /// Builds settings from the server config section.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let public_base_url = config
            .public_base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map_or_else(|| format!("http://{}", config.bind.trim()), str::to_string);
        Self {
            rate_limit_per_minute: config.rate_limit_per_minute,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_body_bytes: config.max_body_bytes,
            exempt_loopback: true,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs.max(1)),
        }
    }
}

/// Shared handler state.
pub struct ApiState {
    /// Limits and addressing.
    settings: ApiSettings,
    /// Monitor handle for snapshots and immediate checks.
    monitor: MonitorHandle,
    /// State file handles.
    stores: StateStores,
    /// Serializes users registry read-modify-write.
    registry: tokio::sync::Mutex<()>,
    /// Priority mail path; `None` when no relay is configured.
    notifier: Option<Notifier>,
    /// Per-client request windows.
    limiter: Mutex<HashMap<IpAddr, SlidingWindow>>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Event sink.
    events: Arc<dyn MonitorEventSink>,
}

impl ApiState {
    /// Creates handler state.
    #[must_use]
    pub fn new(
        settings: ApiSettings,
        monitor: MonitorHandle,
        stores: StateStores,
        notifier: Option<Notifier>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn MonitorEventSink>,
    ) -> Self {
        Self {
            settings,
            monitor,
            stores,
            registry: tokio::sync::Mutex::new(()),
            notifier,
            limiter: Mutex::new(HashMap::new()),
            clock,
            events,
        }
    }

    /// Admits one request from `ip`, or returns the wait.
    ///
    /// # Errors
    ///
    /// Returns the time until a slot frees when the window is full.
    pub fn admit(&self, ip: IpAddr, now: std::time::Instant) -> Result<(), Duration> {
        if self.settings.exempt_loopback && ip.is_loopback() {
            return Ok(());
        }
        let Ok(mut windows) = self.limiter.lock() else {
            return Ok(());
        };
        windows.retain(|_, window| !window.is_idle(now));
        windows
            .entry(ip)
            .or_insert_with(|| SlidingWindow::per_minute(self.settings.rate_limit_per_minute))
            .try_acquire(now)
    }

    /// Runs `mutate` on the users document under the registry lock and
    /// saves when it returns `Ok`.
    async fn with_users<T, F>(&self, mutate: F) -> Result<T, Response>
    where
        F: FnOnce(&mut UsersDocument, Timestamp) -> Result<T, Response>,
    {
        let _guard = self.registry.lock().await;
        let mut document = load_users(&self.stores.users, self.events.as_ref())
            .map_err(|err| internal_error(&err.to_string()))?;
        let now = self.clock.now();
        let value = mutate(&mut document, now)?;
        self.stores
            .users
            .save(&mut document, now)
            .map_err(|err| internal_error(&err.to_string()))?;
        Ok(value)
    }

    /// Reads the users document under the registry lock.
    async fn read_users(&self) -> Result<UsersDocument, Response> {
        let _guard = self.registry.lock().await;
        load_users(&self.stores.users, self.events.as_ref())
            .map_err(|err| internal_error(&err.to_string()))
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    let max_body = state.settings.max_body_bytes;
    Router::new()
        .route("/api/public-status", get(handle_public_status))
        .route("/api/add-code", post(handle_add_code))
        .route("/api/verify-add/{token}", get(handle_verify_add))
        .route("/api/send-manage-code", post(handle_send_manage_code))
        .route("/api/verify-manage", post(handle_verify_manage))
        .route("/api/delete-code", post(handle_delete_code))
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/verify-session", post(handle_verify_session))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit))
        .with_state(state)
}

/// Binds the listener.
///
/// # Errors
///
/// Returns [`RuntimeError::Server`] when the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RuntimeError> {
    TcpListener::bind(addr)
        .await
        .map_err(|err| RuntimeError::Server(format!("bind {addr}: {err}")))
}

/// Serves the API until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`RuntimeError::Server`] when the server fails.
pub async fn serve<F>(
    state: Arc<ApiState>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), RuntimeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| RuntimeError::Server(err.to_string()))
}

/// Sweeps expired sessions, codes, and pending additions periodically.
#[must_use]
pub fn spawn_cleanup(state: Arc<ApiState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(state.settings.cleanup_interval).await;
            let _ = purge_expired(&state).await;
        }
    })
}

/// Runs one sweep. Returns the number of removed entries.
///
/// # Errors
///
/// Returns [`RuntimeError::Store`] when the registry cannot be read or written.
pub async fn purge_expired(state: &ApiState) -> Result<usize, RuntimeError> {
    let _guard = state.registry.lock().await;
    let mut document = load_users(&state.stores.users, state.events.as_ref())?;
    let now = state.clock.now();
    let purged = document.purge_expired(now).total();
    if purged > 0 {
        state.stores.users.save(&mut document, now)?;
    }
    Ok(purged)
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Rejects clients over their per-minute budget.
async fn rate_limit(State(state): State<Arc<ApiState>>, request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    if let Some(ip) = client
        && state.admit(ip, Instant::now().into_std()).is_err()
    {
        let mut response =
            json_error(StatusCode::TOO_MANY_REQUESTS, "Too many requests, please slow down");
        response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        return response;
    }
    next.run(request).await
}

// ============================================================================
// SECTION: Request Bodies
// ============================================================================

/// `add-code` body.
#[derive(Debug, Default, Deserialize)]
struct AddCodeRequest {
    /// Code to monitor.
    #[serde(default)]
    code: String,
    /// Notification address.
    #[serde(default)]
    email: String,
}

/// Email-only body.
#[derive(Debug, Default, Deserialize)]
struct EmailRequest {
    /// Address.
    #[serde(default)]
    email: String,
}

/// Credentials accepted by the management endpoints.
#[derive(Debug, Default, Deserialize)]
struct AuthRequest {
    /// Address proven by `verification_code`.
    #[serde(default)]
    email: String,
    /// Six-digit management code.
    #[serde(default)]
    verification_code: String,
    /// Existing session.
    #[serde(default)]
    session_id: String,
    /// Code to delete.
    #[serde(default)]
    code: String,
}

/// One of the caller's codes.
#[derive(Debug, Serialize)]
struct ManagedCode {
    /// Code.
    code: QueryCode,
    /// Status label.
    status: String,
    /// Last check.
    last_checked: Option<Timestamp>,
    /// Next scheduled check.
    next_check: Option<Timestamp>,
    /// Registration time.
    added_at: Timestamp,
    /// Free-form note.
    note: Option<String>,
}

/// Public status row.
#[derive(Debug, Serialize)]
struct PublicItem {
    /// Code.
    code: QueryCode,
    /// Status label.
    status: String,
    /// Last check.
    last_checked: Option<Timestamp>,
    /// Last status change.
    last_changed: Option<Timestamp>,
    /// Next scheduled check.
    next_check: Option<Timestamp>,
    /// Consecutive failed checks.
    consecutive_fail_count: u32,
    /// Declared check interval.
    freq_minutes: Option<u32>,
    /// Free-form note.
    note: Option<String>,
    /// Declaration source.
    origin: CodeOrigin,
    /// Registration time.
    added_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /api/public-status`.
async fn handle_public_status(State(state): State<Arc<ApiState>>) -> Response {
    let snapshot = state.monitor.current();
    let loaded = match state.stores.status.load_document() {
        Ok(loaded) => loaded,
        Err(err) => return internal_error(&err.to_string()),
    };
    let users_generated = state.read_users().await.ok().and_then(|document| document.generated_at);
    let document = loaded.value.unwrap_or_default();
    let items: Vec<PublicItem> = snapshot
        .tracked
        .iter()
        .map(|tracked| {
            let stored = document.items.get(&tracked.code);
            PublicItem {
                code: tracked.code.clone(),
                status: stored.map_or(PENDING_LABEL, |item| item.status_label()).to_string(),
                last_checked: stored.and_then(|item| item.last_checked),
                last_changed: stored.and_then(|item| item.last_changed),
                next_check: stored.and_then(|item| item.next_check),
                consecutive_fail_count: stored.map_or(0, |item| item.consecutive_fail_count),
                freq_minutes: tracked.freq_minutes,
                note: tracked.note.clone(),
                origin: tracked.origin,
                added_at: stored.and_then(|item| item.added_at),
            }
        })
        .collect();
    let generated_at = [document.generated_at, users_generated]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or_else(|| state.clock.now());
    (StatusCode::OK, Json(json!({ "generated_at": generated_at, "items": items }))).into_response()
}

/// `POST /api/add-code`.
async fn handle_add_code(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: AddCodeRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let email = normalize_email(&request.email);
    if request.code.trim().is_empty() || email.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Code and email are required");
    }
    let code = QueryCode::new(&request.code);
    if QueryType::CzResidence.validate_code(&code).is_err() {
        return json_error(StatusCode::BAD_REQUEST, "Invalid visa code format");
    }
    if !looks_like_email(&email) {
        return json_error(StatusCode::BAD_REQUEST, "Invalid email address");
    }
    if let Some(existing) = state.monitor.current().find(&code)
        && let Some(target) = existing.target.as_deref()
    {
        return duplicate_response(&email, target);
    }
    let Some(notifier) = state.notifier.clone() else {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Email service not configured");
    };
    let token = random_token();
    let begun = state
        .with_users(|document, now| {
            document
                .begin_addition(token.clone(), code.clone(), &email, now)
                .map_err(|err| match err {
                    RegistryError::Duplicate(owner) => duplicate_response(&email, &owner),
                    other => internal_error(&other.to_string()),
                })
        })
        .await;
    if let Err(response) = begun {
        return response;
    }
    let base = state.settings.public_base_url.as_str();
    let url = format!("{base}/api/verify-add/{token}");
    let message = verification_email(&email, &code, &url, Some(base));
    match notifier.send_priority(&message).await {
        Ok(()) => ok_message("Verification email sent successfully"),
        Err(err) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to send email: {err}"),
        ),
    }
}

/// `GET /api/verify-add/{token}`.
async fn handle_verify_add(
    State(state): State<Arc<ApiState>>,
    Path(token): Path<String>,
) -> Response {
    let base = state.settings.public_base_url.clone();
    let configured = state.monitor.current();
    let session_id = random_token();
    let completed = state
        .with_users(|document, now| {
            let pending_code =
                document.pending_additions.get(&token).map(|pending| pending.code.clone());
            if let Some(code) = pending_code
                && configured
                    .find(&code)
                    .is_some_and(|tracked| tracked.origin == CodeOrigin::Config)
            {
                document.pending_additions.remove(&token);
                return Err(page(
                    StatusCode::BAD_REQUEST,
                    "Already Monitored",
                    "This code is already being monitored.",
                    &base,
                ));
            }
            let record = document.complete_addition(&token, now).map_err(|err| match err {
                RegistryError::Expired => page(
                    StatusCode::BAD_REQUEST,
                    "Link Expired",
                    "This verification link has expired. Verification links expire after 10 minutes; please submit a new request.",
                    &base,
                ),
                RegistryError::Duplicate(_) => page(
                    StatusCode::BAD_REQUEST,
                    "Already Monitored",
                    "This code is already being monitored.",
                    &base,
                ),
                _ => page(
                    StatusCode::BAD_REQUEST,
                    "Invalid Verification Link",
                    "This verification link is invalid or has already been used.",
                    &base,
                ),
            })?;
            document.create_session(session_id.clone(), &record.target, now);
            Ok(record)
        })
        .await;
    let record = match completed {
        Ok(record) => record,
        Err(response) => return response,
    };
    let _ = state.monitor.try_send(ControlMessage::CheckNow);
    let message = format!(
        "Code {} has been added to the monitoring system. You will receive email notifications when the status changes.",
        record.code
    );
    let mut response = page(StatusCode::OK, "Code Added", &message, &base);
    set_session_cookie(&mut response, Some(session_id.as_str()));
    response
}

/// `POST /api/send-manage-code`.
async fn handle_send_manage_code(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: EmailRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Email is required");
    }
    let Some(notifier) = state.notifier.clone() else {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Email service not configured");
    };
    let digits = six_digit_code();
    let issued = state
        .with_users(|document, now| {
            if document.codes_for(&email).is_empty() {
                return Err(json_error(
                    StatusCode::NOT_FOUND,
                    "No codes found for this email address",
                ));
            }
            document.issue_verification(&email, digits.clone(), now);
            Ok(())
        })
        .await;
    if let Err(response) = issued {
        return response;
    }
    match notifier.send_priority(&management_code_email(&email, &digits)).await {
        Ok(()) => ok_message("Verification code sent successfully"),
        Err(err) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to send email: {err}"),
        ),
    }
}

/// `POST /api/verify-manage`.
async fn handle_verify_manage(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: AuthRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let new_session = random_token();
    let authed = state
        .with_users(|document, now| {
            let (email, created) =
                authenticate(document, &request, now, Some(new_session.as_str()))?;
            let records: Vec<_> = document.codes_for(&email).into_iter().cloned().collect();
            Ok((records, created))
        })
        .await;
    let (records, created) = match authed {
        Ok(value) => value,
        Err(response) => return response,
    };
    let items = state.stores.status.load_all().unwrap_or_default();
    let codes: Vec<ManagedCode> = records
        .into_iter()
        .map(|record| {
            let stored = items.get(&record.code);
            ManagedCode {
                status: stored.map_or(PENDING_LABEL, |item| item.status_label()).to_string(),
                last_checked: stored.and_then(|item| item.last_checked),
                next_check: stored.and_then(|item| item.next_check),
                added_at: record.added_at,
                note: record.note,
                code: record.code,
            }
        })
        .collect();
    let mut payload = json!({ "codes": codes });
    if created {
        payload["session_id"] = json!(new_session);
    }
    let mut response = (StatusCode::OK, Json(payload)).into_response();
    if created {
        set_session_cookie(&mut response, Some(new_session.as_str()));
    }
    response
}

/// `POST /api/delete-code`.
async fn handle_delete_code(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: AuthRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.code.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Code is required");
    }
    let code = QueryCode::new(&request.code);
    let removed = state
        .with_users(|document, now| {
            let (email, _) = authenticate(document, &request, now, None)?;
            document
                .remove_code(&code, &email)
                .map_err(|_| json_error(StatusCode::NOT_FOUND, "Code not found for this user"))
        })
        .await;
    match removed {
        Ok(_) => {
            let _ = state.monitor.try_send(ControlMessage::CheckNow);
            ok_message("Code deleted successfully")
        }
        Err(response) => response,
    }
}

/// `POST /api/login`.
async fn handle_login(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: AuthRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.email.trim().is_empty() || request.verification_code.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Email and verification code are required");
    }
    let session_id = random_token();
    let created = state
        .with_users(|document, now| {
            document
                .consume_verification(&request.email, &request.verification_code, now)
                .map_err(|err| match err {
                    RegistryError::NotFound => json_error(
                        StatusCode::BAD_REQUEST,
                        "No verification code found for this email",
                    ),
                    _ => json_error(
                        StatusCode::BAD_REQUEST,
                        "Invalid or expired verification code",
                    ),
                })?;
            document.create_session(session_id.clone(), &request.email, now);
            Ok(document.sessions.get(&session_id).map(|session| session.expires_at))
        })
        .await;
    match created {
        Ok(expires) => {
            let mut response = (
                StatusCode::OK,
                Json(json!({
                    "message": "Login successful",
                    "session_id": session_id,
                    "expires": expires,
                })),
            )
                .into_response();
            set_session_cookie(&mut response, Some(session_id.as_str()));
            response
        }
        Err(response) => response,
    }
}

/// `POST /api/logout`.
async fn handle_logout(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: AuthRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let session_id = request.session_id.trim().to_string();
    if session_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Session ID is required");
    }
    let removed = state
        .with_users(|document, _| {
            if document.remove_session(&session_id) {
                Ok(())
            } else {
                Err(json_error(StatusCode::BAD_REQUEST, "Invalid session ID"))
            }
        })
        .await;
    match removed {
        Ok(()) => {
            let mut response = ok_message("Logout successful");
            set_session_cookie(&mut response, None);
            response
        }
        Err(response) => response,
    }
}

/// `POST /api/verify-session`.
async fn handle_verify_session(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let request: AuthRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let session_id = request.session_id.trim().to_string();
    if session_id.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Session ID is required");
    }
    let verified = state
        .with_users(|document, now| {
            let email = document.touch_session(&session_id, now).map_err(|err| match err {
                RegistryError::Expired => json_error(StatusCode::UNAUTHORIZED, "Session expired"),
                _ => json_error(StatusCode::UNAUTHORIZED, "Session not found"),
            })?;
            let expires = document.sessions.get(&session_id).map(|session| session.expires_at);
            Ok((email, expires))
        })
        .await;
    match verified {
        Ok((email, expires)) => (
            StatusCode::OK,
            Json(json!({ "valid": true, "email": email, "expires": expires })),
        )
            .into_response(),
        Err(response) => response,
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the caller's email from a session or a management code.
///
/// With a code and `new_session`, a session is created; the flag in the
/// result says whether that happened.
fn authenticate(
    document: &mut UsersDocument,
    request: &AuthRequest,
    now: Timestamp,
    new_session: Option<&str>,
) -> Result<(String, bool), Response> {
    let session_id = request.session_id.trim();
    if !session_id.is_empty() {
        let email = document.touch_session(session_id, now).map_err(|err| match err {
            RegistryError::Expired => json_error(StatusCode::UNAUTHORIZED, "Session expired"),
            _ => json_error(StatusCode::UNAUTHORIZED, "Invalid session"),
        })?;
        return Ok((email, false));
    }
    let email = normalize_email(&request.email);
    if email.is_empty() || request.verification_code.trim().is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Email and verification code, or session ID required",
        ));
    }
    document.consume_verification(&email, &request.verification_code, now).map_err(|err| {
        let message = match err {
            RegistryError::NotFound => "No verification code found for this email",
            RegistryError::Expired => "Verification code has expired",
            _ => "Invalid verification code",
        };
        json_error(StatusCode::BAD_REQUEST, message)
    })?;
    if let Some(session_id) = new_session {
        document.create_session(session_id.to_string(), &email, now);
        return Ok((email, true));
    }
    Ok((email, false))
}

/// Parses a JSON body, mapping failures to 400.
fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body)
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid JSON data"))
}

/// Builds the duplicate-code rejection.
fn duplicate_response(email: &str, owner: &str) -> Response {
    if normalize_email(owner) == email {
        return json_error(
            StatusCode::BAD_REQUEST,
            "This code is already being monitored for this email",
        );
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "This code is already being monitored",
            "details": format!(
                "This visa code is already being monitored for {}. If this is your code, please contact support.",
                mask_email(owner)
            ),
        })),
    )
        .into_response()
}

/// Builds `{"error": message}`.
fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Builds a 500 response.
fn internal_error(detail: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "details": detail })),
    )
        .into_response()
}

/// Builds `{"message": message}` with 200.
fn ok_message(message: &str) -> Response {
    (StatusCode::OK, Json(json!({ "message": message }))).into_response()
}

/// Renders a minimal result page for link clicks.
fn page(status: StatusCode, title: &str, message: &str, base_url: &str) -> Response {
    let title = escape_html(title);
    let message = escape_html(message);
    let base = escape_html(base_url);
    let html = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family:Arial,sans-serif; max-width:560px; margin:40px auto;\">\
         <h2>{title}</h2><p>{message}</p><p><a href=\"{base}\">{base}</a></p></body></html>"
    );
    (status, Html(html)).into_response()
}

/// Sets or clears the session cookie.
fn set_session_cookie(response: &mut Response, session_id: Option<&str>) {
    let cookie = session_id.map_or_else(
        || format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; SameSite=Lax"),
        |id| format!("{SESSION_COOKIE}={id}; Path=/; Max-Age={SESSION_COOKIE_MAX_AGE}; SameSite=Lax"),
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(SET_COOKIE, value);
    }
}

/// Returns a URL-safe random token.
fn random_token() -> String {
    let mut bytes = [0_u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Returns a zero-padded six-digit code.
fn six_digit_code() -> String {
    format!("{:06}", OsRng.gen_range(0 .. 1_000_000_u32))
}
