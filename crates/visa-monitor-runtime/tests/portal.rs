// crates/visa-monitor-runtime/tests/portal.rs
// ============================================================================
// Module: Portal Executor Tests
// Description: Form navigation and submission against a stub status portal.
// Purpose: Keep the session cookie and hidden token flowing from GET to POST.
// Dependencies: visa-monitor-runtime, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! The stub portal issues a fresh session cookie and a matching hidden token
//! on every form load, and answers the POST only when both agree.

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

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Form;
use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::COOKIE;
use axum::http::header::SET_COOKIE;
use axum::response::Html;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use tokio::net::TcpListener;
use url::Url;
use visa_monitor_core::ExecutionError;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::QueryType;
use visa_monitor_runtime::PortalExecutor;
use visa_monitor_runtime::PortalSettings;

/// Form page with a per-load session cookie and token.
async fn form_page(State(sessions): State<Arc<AtomicU32>>) -> impl IntoResponse {
    let id = sessions.fetch_add(1, Ordering::SeqCst);
    (
        [(SET_COOKIE, format!("session=s{id}; Path=/; HttpOnly"))],
        Html(format!(
            r#"<html><body><form method="post" action="/status/submit">
            <input type="hidden" name="_token" value="t{id}">
            <input type="text" name="visaApplicationNumber">
            </form></body></html>"#
        )),
    )
}

/// Accepts the submission only when the cookie session matches the token.
async fn submit(headers: HeaderMap, Form(fields): Form<HashMap<String, String>>) -> Response {
    let session = headers
        .get(COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').map(str::trim).find_map(|pair| pair.strip_prefix("session=s"))
        })
        .map(str::to_string);
    let token = fields.get("_token").and_then(|value| value.strip_prefix('t'));
    match (session.as_deref(), token) {
        (Some(session), Some(token)) if session == token => {
            let code = fields.get("visaApplicationNumber").cloned().unwrap_or_default();
            Html(format!(
                r#"<div class="alert"><div class="alert__content">{code}: proceedings</div></div>"#
            ))
            .into_response()
        }
        _ => (StatusCode::from_u16(419).unwrap(), "session expired").into_response(),
    }
}

/// Starts the stub portal and returns its form URL.
async fn start_portal() -> Url {
    let app = Router::new()
        .route("/status", get(form_page))
        .route("/status/submit", post(submit))
        .with_state(Arc::new(AtomicU32::new(1)));
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/status")).unwrap()
}

fn executor(url: Url) -> PortalExecutor {
    PortalExecutor::new(PortalSettings {
        url,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        user_agent: "visa-monitor-tests".to_string(),
    })
}

#[tokio::test]
async fn session_cookie_carries_from_form_to_submission() {
    let executor = executor(start_portal().await);
    let context = executor.open_context().await.unwrap();
    let page = executor.navigate(&context, QueryType::CzResidence).await.unwrap();
    assert!(page.action.path().ends_with("/status/submit"));
    assert_eq!(page.hidden, vec![("_token".to_string(), "t1".to_string())]);

    let code = QueryCode::new("PEKI202506020001");
    let text = executor.fill_and_read(&context, page, &code).await.unwrap();
    assert_eq!(text.0, "PEKI202506020001: proceedings");
    executor.close_context(context).await;
}

#[tokio::test]
async fn interleaved_checks_keep_their_own_sessions() {
    let executor = executor(start_portal().await);
    let context = executor.open_context().await.unwrap();
    let first = executor.navigate(&context, QueryType::CzResidence).await.unwrap();
    let second = executor.navigate(&context, QueryType::CzResidence).await.unwrap();

    let later = QueryCode::new("PEKI202506020002");
    let earlier = QueryCode::new("PEKI202506020001");
    let text = executor.fill_and_read(&context, second, &later).await.unwrap();
    assert_eq!(text.0, "PEKI202506020002: proceedings");
    let text = executor.fill_and_read(&context, first, &earlier).await.unwrap();
    assert_eq!(text.0, "PEKI202506020001: proceedings");
}

#[tokio::test]
async fn missing_form_field_is_element_missing() {
    let app = Router::new().route("/status", get(|| async { Html("<p>maintenance</p>") }));
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let executor = executor(Url::parse(&format!("http://{addr}/status")).unwrap());
    let context = executor.open_context().await.unwrap();
    let result = executor.navigate(&context, QueryType::CzResidence).await;
    assert!(matches!(result, Err(ExecutionError::ElementMissing(_))));
}
