// crates/visa-monitor-notify/src/templates.rs
// ============================================================================
// Module: Email Templates
// Description: Subjects and HTML bodies for status and self-service emails.
// Purpose: Render every outbound message in one consistent layout.
// Dependencies: visa-monitor-core, time
// ============================================================================

//! ## Overview
//! Status emails are sent on the first recorded status and on every change
//! of the last known valid status. All templates share one bilingual card
//! layout. Interpolated values are HTML-escaped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use time::macros::format_description;
use visa_monitor_core::NotificationIntent;
use visa_monitor_core::OutboundEmail;
use visa_monitor_core::QueryCode;
use visa_monitor_core::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Type label for first-status emails.
pub const FIRST_CHECK_LABEL: &str = "首次查询 / First check";
/// Type label for transition emails.
pub const STATUS_CHANGE_LABEL: &str = "状态变化 / Status change";
/// Subject of the add-code confirmation email.
pub const VERIFICATION_SUBJECT: &str = "Czech Visa Monitor - Verify New Code Addition";
/// Subject of the management code email.
pub const MANAGEMENT_SUBJECT: &str = "Czech Visa Monitor - Management Verification Code";

/// Outer wrapper opening tags shared by every template.
const CARD_OPEN: &str = "<div style=\"font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, 'Noto Sans', 'PingFang SC', 'Microsoft YaHei', sans-serif; line-height:1.6; color:#222;\">\n<div style=\"max-width:680px; margin:24px auto; border:1px solid #eee; border-radius:10px; overflow:hidden;\">\n";
/// Outer wrapper closing tags.
const CARD_CLOSE: &str = "</div>\n</div>\n";
/// Label cell style.
const LABEL_STYLE: &str = "width:160px; color:#555;";

// ============================================================================
// SECTION: Status Emails
// ============================================================================

/// Inputs for a status notification email.
#[derive(Debug, Clone, Copy)]
pub struct StatusEmailParams<'a> {
    /// Applicant code.
    pub code: &'a QueryCode,
    /// What changed.
    pub intent: &'a NotificationIntent,
    /// Time of the reading.
    pub checked_at: Timestamp,
    /// Public status page link, when the API is exposed.
    pub public_base_url: Option<&'a str>,
}

/// Builds the status email subject.
#[must_use]
pub fn status_subject(code: &QueryCode, intent: &NotificationIntent) -> String {
    format!("[{}] {} - CZ Visa Status 状态通知", intent.current().label(), code)
}

/// Builds the status email HTML body.
#[must_use]
pub fn status_body(params: &StatusEmailParams<'_>) -> String {
    let code = escape_html(params.code.as_str());
    let current = escape_html(params.intent.current().label());
    let mut html = String::from(CARD_OPEN);
    let _ = writeln!(
        html,
        "<div style=\"padding:16px 20px; background:#0b5ed7; color:#fff;\">\n<div style=\"font-weight:600; font-size:16px;\">CZ Visa Status · Notification / 通知</div>\n<div style=\"margin-top:4px; font-size:13px;\">Code <b>{code}</b> · Status <b>{current}</b></div>\n</div>"
    );
    html.push_str("<div style=\"padding:16px 20px; background:#fff;\">\n<table style=\"width:100%; border-collapse:collapse; font-size:14px;\">\n");
    push_row(&mut html, "Code / 查询码", &format!("<code>{code}</code>"));
    let kind = match params.intent {
        NotificationIntent::FirstStatus {
            ..
        } => FIRST_CHECK_LABEL,
        NotificationIntent::Transition {
            ..
        } => STATUS_CHANGE_LABEL,
    };
    push_row(&mut html, "Type / 通知类型", kind);
    if let NotificationIntent::Transition {
        from,
        to,
    } = params.intent
    {
        push_row(
            &mut html,
            "Status Change / 状态变化",
            &format!(
                "<b>{}</b> &rarr; <b>{}</b>",
                escape_html(from.label()),
                escape_html(to.label())
            ),
        );
    }
    push_row(&mut html, "Current Status / 当前状态", &format!("<b>{current}</b>"));
    push_row(&mut html, "Time / 时间", &escape_html(&format_when(params.checked_at)));
    html.push_str("</table>\n</div>\n");
    html.push_str("<div style=\"padding:12px 20px; background:#fafafa; color:#666; font-size:12px; border-top:1px solid #eee;\">\nNote: Emails are sent on first record or when status changes; \"Query Failed / 查询失败\" won't trigger notifications. / 说明：首次记录或状态变化时发送；“查询失败”不触发通知。\n");
    if let Some(url) = params.public_base_url {
        let url = escape_html(url);
        let _ = writeln!(
            html,
            "<div style=\"margin-top:6px;\">Live status / 实时状态：<a href=\"{url}\" style=\"color:#0b5ed7;\">{url}</a></div>"
        );
    }
    html.push_str("</div>\n");
    html.push_str(CARD_CLOSE);
    html
}

/// Renders a complete status email to `to`.
#[must_use]
pub fn status_email(to: &str, params: &StatusEmailParams<'_>) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: status_subject(params.code, params.intent),
        html_body: status_body(params),
    }
}

// ============================================================================
// SECTION: Self-Service Emails
// ============================================================================

/// Renders the add-code confirmation email.
#[must_use]
pub fn verification_email(
    to: &str,
    code: &QueryCode,
    verification_url: &str,
    base_url: Option<&str>,
) -> OutboundEmail {
    let code = escape_html(code.as_str());
    let email = escape_html(to);
    let link = escape_html(verification_url);
    let mut html = String::from(CARD_OPEN);
    let _ = writeln!(
        html,
        "<div style=\"padding:16px 20px; background:#0b5ed7; color:#fff;\">\n<div style=\"font-weight:600; font-size:16px;\">CZ Visa Status 验证</div>\n<div style=\"margin-top:4px; font-size:13px;\">Code <b>{code}</b> · 邮箱 <b>{email}</b></div>\n</div>"
    );
    html.push_str("<div style=\"padding:16px 20px; background:#fff;\">\n<table style=\"width:100%; border-collapse:collapse; font-size:14px;\">\n");
    push_row(&mut html, "操作 / Action", "新增监控代码（需验证）/ Add code (verification required)");
    push_row(&mut html, "查询码 / Code", &format!("<code>{code}</code>"));
    push_row(&mut html, "邮箱 / Email", &email);
    push_row(&mut html, "有效期 / Expires", "10 分钟 / 10 minutes");
    html.push_str("</table>\n");
    let _ = writeln!(
        html,
        "<div style=\"text-align:center; margin:20px 0 4px;\"><a href=\"{link}\" style=\"background:#0b5ed7; color:#fff; padding:10px 18px; text-decoration:none; border-radius:8px;\">确认添加 / Confirm</a></div>\n</div>"
    );
    html.push_str("<div style=\"padding:12px 20px; background:#fafafa; color:#666; font-size:12px; border-top:1px solid #eee;\">\n说明：若非本人操作，请忽略本邮件；未验证将不会添加该查询码。\n");
    if let Some(base) = base_url {
        let base = escape_html(base);
        let _ = writeln!(html, "<div style=\"margin-top:6px;\">主页 / Main site：<a href=\"{base}\">{base}</a></div>");
    }
    html.push_str("</div>\n");
    html.push_str(CARD_CLOSE);
    OutboundEmail {
        to: to.to_string(),
        subject: VERIFICATION_SUBJECT.to_string(),
        html_body: html,
    }
}

/// Renders the six-digit management code email.
#[must_use]
pub fn management_code_email(to: &str, verification_code: &str) -> OutboundEmail {
    let digits = escape_html(verification_code);
    let mut html = String::from(CARD_OPEN);
    html.push_str("<div style=\"padding:16px 20px; background:#0b5ed7; color:#fff;\">\n<div style=\"font-weight:600; font-size:16px;\">CZ Visa Status 管理验证</div>\n<div style=\"margin-top:4px; font-size:13px;\">Management Verification Code</div>\n</div>\n");
    html.push_str("<div style=\"padding:16px 20px; background:#fff;\">\n<table style=\"width:100%; border-collapse:collapse; font-size:14px;\">\n");
    push_row(&mut html, "用途 / Purpose", "查看 / 管理我的查询码 / View and manage my codes");
    push_row(
        &mut html,
        "验证码 / Code",
        &format!(
            "<div style=\"font-family:'Courier New', monospace; font-weight:700; letter-spacing:4px; font-size:22px; color:#0b5ed7;\">{digits}</div>"
        ),
    );
    push_row(&mut html, "有效期 / Expires", "10 分钟 / 10 minutes");
    html.push_str("</table>\n</div>\n");
    html.push_str("<div style=\"padding:12px 20px; background:#fafafa; color:#666; font-size:12px; border-top:1px solid #eee;\">\n说明：若非本人操作，请忽略本邮件；验证码过期请重新获取。\n</div>\n");
    html.push_str(CARD_CLOSE);
    OutboundEmail {
        to: to.to_string(),
        subject: MANAGEMENT_SUBJECT.to_string(),
        html_body: html,
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Appends a two-column table row; `value` must already be escaped.
fn push_row(html: &mut String, label: &str, value: &str) {
    let _ = writeln!(html, "<tr><td style=\"{LABEL_STYLE}\">{label}</td><td>{value}</td></tr>");
}

/// Formats a reading time as `YYYY-MM-DD HH:MM:SS UTC`.
#[must_use]
pub fn format_when(at: Timestamp) -> String {
    at.as_datetime()
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
        .unwrap_or_else(|_| at.to_rfc3339())
}

/// Escapes text for inclusion in HTML.
#[must_use]
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use visa_monitor_core::NormalizedStatus;

    use super::*;

    #[test]
    fn escape_html_covers_markup() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn first_status_body_has_no_change_row() {
        let code = QueryCode::new("PEKI202506020001");
        let intent = NotificationIntent::FirstStatus {
            status: NormalizedStatus::Proceedings,
        };
        let Some(at) = Timestamp::from_unix_millis(0) else {
            return;
        };
        let body = status_body(&StatusEmailParams {
            code: &code,
            intent: &intent,
            checked_at: at,
            public_base_url: None,
        });
        assert!(body.contains(FIRST_CHECK_LABEL));
        assert!(!body.contains("Status Change / 状态变化"));
        assert!(body.contains("1970-01-01 00:00:00 UTC"));
    }
}
