// crates/visa-monitor-cli/src/i18n.rs
// ============================================================================
// Module: CLI Internationalization Helpers
// Description: Message catalog and translation utilities for the CLI.
// Purpose: Keep every operator-facing string in one bilingual catalog.
// Dependencies: Standard library collections and formatting utilities.
// ============================================================================

//! ## Overview
//! The `visa-monitor` binary routes operator-facing output through a small
//! English/Chinese catalog. All runtime output should go through the
//! [`t!`](crate::t) macro.
//!
//! ## Invariants
//! - The locale is chosen once at startup and read-only thereafter.
//! - Missing keys fall back to English and then to the key itself.
//! - Placeholder substitutions preserve deterministic order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Supported CLI locales.
///
/// # Invariants
/// - [`Locale::En`] is the default fallback locale.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Locale {
    /// English (default).
    En,
    /// Simplified Chinese.
    Zh,
}

impl Locale {
    /// Returns the canonical locale label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }

    /// Parses a locale value, ignoring case and region tags (`zh-CN`, `en_US`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let lang = normalized.split(['-', '_', '.']).next().unwrap_or("");
        match lang {
            "en" => Some(Self::En),
            "zh" | "cn" => Some(Self::Zh),
            _ => None,
        }
    }
}

/// Ordered list of supported CLI locales.
pub const SUPPORTED_LOCALES: &[Locale] = &[Locale::En, Locale::Zh];

/// A formatted message argument captured by the [`macro@crate::t`] macro.
#[derive(Clone)]
pub struct MessageArg {
    /// Placeholder name without braces (for example, `path`).
    pub key: &'static str,
    /// Preformatted value substituted for the placeholder.
    pub value: String,
}

impl MessageArg {
    /// Constructs a new [`MessageArg`].
    pub fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

// ============================================================================
// SECTION: Locale Selection
// ============================================================================

/// Global locale selection for CLI output.
static CURRENT_LOCALE: OnceLock<Locale> = OnceLock::new();

/// Sets the CLI locale. Only the first call wins.
pub fn set_locale(locale: Locale) {
    let _ = CURRENT_LOCALE.set(locale);
}

/// Returns the current CLI locale (defaults to English).
#[must_use]
pub fn current_locale() -> Locale {
    CURRENT_LOCALE.get().copied().unwrap_or(Locale::En)
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// English catalog entries.
const CATALOG_EN: &[(&str, &str)] = &[
    ("main.version", "visa-monitor {version}"),
    ("output.stream.stdout", "stdout"),
    ("output.stream.stderr", "stderr"),
    ("output.stream.unknown", "output"),
    ("output.write_failed", "Failed to write to {stream}: {error}"),
    ("i18n.lang.invalid_env", "Invalid value for {env}: {value}. Expected 'en' or 'zh'."),
    ("config.load_failed", "Failed to load config: {error}"),
    ("config.validate.ok", "Config OK: {codes} tracked codes ({path})"),
    ("codegen.invalid_date", "Invalid {field} date: {value}. Expected YYYY-MM-DD."),
    ("codegen.failed", "Code generation failed: {error}"),
    ("codegen.write_failed", "Failed to write {path}: {error}"),
    ("codegen.ok", "Generated {count} codes, saved to {path}"),
    ("check.read_failed", "Failed to read {path}: {error}"),
    ("check.failed", "Batch check failed: {error}"),
    (
        "check.summary",
        "Checked {checked} codes across {rows} rows ({skipped} already answered, {failures} \
         failed); wrote {written} rows to {path}",
    ),
    ("check.status_line", "- {status}: {count}"),
    ("check.fails_written", "Failures recorded in {path}"),
    ("check.cancelled", "Batch check interrupted; finished rows were saved."),
    ("monitor.store_failed", "State store failure: {error}"),
    ("monitor.runtime_failed", "Monitor failed: {error}"),
    ("monitor.log_failed", "Failed to open event log {path}: {error}"),
    ("monitor.smtp_invalid", "Invalid SMTP settings: {error}"),
    (
        "monitor.once.summary",
        "Cycle finished: {due} due, {processed} processed, {failures} failed, {notifications} \
         notifications",
    ),
    ("monitor.server.listening", "Self-service API listening on {addr}"),
    ("monitor.server_failed", "Self-service API failed: {error}"),
    ("systemd.command_failed", "{command} failed: {error}"),
    ("systemd.exe_failed", "Cannot resolve the visa-monitor executable: {error}"),
    ("systemd.unit_write_failed", "Failed to write unit file {path}: {error}"),
    ("systemd.installed", "Installed systemd service: {path}"),
    ("systemd.uninstalled", "Uninstalled systemd service: {name}"),
    ("systemd.action_ok", "{action} {name}: ok"),
    ("systemd.logs_header", "--- Recent logs (journalctl) ---"),
    ("report.read_failed", "Failed to read {path}: {error}"),
    ("report.failed", "Report failed: {error}"),
    ("report.write_failed", "Failed to write {path}: {error}"),
    ("report.archived", "Archived input CSV: {path}"),
    ("report.ok", "Markdown report written: {path}"),
    ("report.json_ok", "JSON summary written: {path}"),
    ("clean.failed", "Clean failed: {error}"),
    ("clean.io_failed", "Failed to access {path}: {error}"),
    (
        "clean.summary",
        "Codes total: {total}, kept: {kept}, removed: {removed}; written to {path}",
    ),
    (
        "clean.keep_filter",
        "Keep filter: {letters} (n=Not Found, g=Granted, p=Proceedings, r=Rejected)",
    ),
    ("clean.keep_default", "Default: removed all Not Found codes"),
    ("clean.kept_header", "Kept by status:"),
    ("clean.removed_header", "Removed by status:"),
    ("clean.status_line", "  - {status}: {count}"),
];

/// Chinese catalog entries.
const CATALOG_ZH: &[(&str, &str)] = &[
    ("main.version", "visa-monitor {version}"),
    ("output.stream.stdout", "标准输出"),
    ("output.stream.stderr", "标准错误"),
    ("output.stream.unknown", "输出"),
    ("output.write_failed", "写入{stream}失败：{error}"),
    ("i18n.lang.invalid_env", "{env} 的值无效：{value}。应为 'en' 或 'zh'。"),
    ("config.load_failed", "加载配置失败：{error}"),
    ("config.validate.ok", "配置有效：共 {codes} 个监控查询码（{path}）"),
    ("codegen.invalid_date", "{field} 日期无效：{value}。格式应为 YYYY-MM-DD。"),
    ("codegen.failed", "生成查询码失败：{error}"),
    ("codegen.write_failed", "写入 {path} 失败：{error}"),
    ("codegen.ok", "生成 {count} 条查询码，已保存到 {path}"),
    ("check.read_failed", "读取 {path} 失败：{error}"),
    ("check.failed", "批量查询失败：{error}"),
    (
        "check.summary",
        "共 {rows} 行，查询 {checked} 个查询码（{skipped} 行已有结果，{failures} 个失败）；\
         已写入 {written} 行到 {path}",
    ),
    ("check.status_line", "- {status}：{count}"),
    ("check.fails_written", "失败记录已写入 {path}"),
    ("check.cancelled", "批量查询被中断；已完成的行已保存。"),
    ("monitor.store_failed", "状态存储失败：{error}"),
    ("monitor.runtime_failed", "监控运行失败：{error}"),
    ("monitor.log_failed", "无法打开事件日志 {path}：{error}"),
    ("monitor.smtp_invalid", "SMTP 配置无效：{error}"),
    (
        "monitor.once.summary",
        "本轮完成：到期 {due}，处理 {processed}，失败 {failures}，通知 {notifications}",
    ),
    ("monitor.server.listening", "自助服务 API 监听于 {addr}"),
    ("monitor.server_failed", "自助服务 API 失败：{error}"),
    ("systemd.command_failed", "{command} 执行失败：{error}"),
    ("systemd.exe_failed", "无法确定 visa-monitor 可执行文件路径：{error}"),
    ("systemd.unit_write_failed", "写入服务文件 {path} 失败：{error}"),
    ("systemd.installed", "已安装 systemd 服务：{path}"),
    ("systemd.uninstalled", "已卸载 systemd 服务：{name}"),
    ("systemd.action_ok", "{action} {name}：完成"),
    ("systemd.logs_header", "--- 最近日志（journalctl） ---"),
    ("report.read_failed", "读取 {path} 失败：{error}"),
    ("report.failed", "生成报告失败：{error}"),
    ("report.write_failed", "写入 {path} 失败：{error}"),
    ("report.archived", "已归档输入 CSV：{path}"),
    ("report.ok", "详细报告已生成：{path}"),
    ("report.json_ok", "JSON 摘要已生成：{path}"),
    ("clean.failed", "清理失败：{error}"),
    ("clean.io_failed", "访问 {path} 失败：{error}"),
    ("clean.summary", "查询码总数 {total}，保留 {kept}，删除 {removed}；已写入 {path}"),
    ("clean.keep_filter", "保留类型：{letters}（n=未找到，g=已通过，p=审理中，r=被拒绝）"),
    ("clean.keep_default", "默认：剔除所有未找到的查询码"),
    ("clean.kept_header", "按状态保留统计："),
    ("clean.removed_header", "按状态删除统计："),
    ("clean.status_line", "  - {status}：{count}"),
];

/// Returns the message catalog for the requested locale.
pub(crate) fn catalog_for(locale: Locale) -> &'static HashMap<&'static str, &'static str> {
    static CATALOG_EN_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    static CATALOG_ZH_MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    match locale {
        Locale::En => CATALOG_EN_MAP.get_or_init(|| CATALOG_EN.iter().copied().collect()),
        Locale::Zh => CATALOG_ZH_MAP.get_or_init(|| CATALOG_ZH.iter().copied().collect()),
    }
}

// ============================================================================
// SECTION: Translation
// ============================================================================

/// Translates `key` using the selected locale while substituting `args`.
#[must_use]
pub fn translate(key: &str, args: Vec<MessageArg>) -> String {
    translate_in(current_locale(), key, args)
}

/// Translates `key` in an explicit locale.
#[must_use]
pub fn translate_in(locale: Locale, key: &str, args: Vec<MessageArg>) -> String {
    let template = catalog_for(locale)
        .get(key)
        .copied()
        .or_else(|| catalog_for(Locale::En).get(key).copied())
        .unwrap_or(key);
    let mut result = template.to_string();
    for arg in args {
        let placeholder = format!("{{{}}}", arg.key);
        result = result.replace(&placeholder, &arg.value);
    }
    result
}

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Formats a localized message from a key and named arguments.
///
/// # Arguments
///
/// - `$key` must match a catalog entry.
/// - Named arguments are substituted into `{placeholder}` positions.
#[macro_export]
macro_rules! t {
    ($key:literal $(, $name:ident = $value:expr )* $(,)?) => {{
        let args = ::std::vec![
            $(
                $crate::i18n::MessageArg::new(stringify!($name), $value.to_string()),
            )*
        ];
        $crate::i18n::translate($key, args)
    }};
}

// ============================================================================
// SECTION: Tests
// ============================================================================
