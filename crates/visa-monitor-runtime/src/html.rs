// crates/visa-monitor-runtime/src/html.rs
// ============================================================================
// Module: Portal HTML Extraction
// Description: Minimal tag scanning for the portal form and result banner.
// Purpose: Read the status text without a DOM dependency.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The portal renders its answer in one of a few known containers. These
//! helpers scan tags case-insensitively, match class tokens and attributes,
//! and return the container's visible text with tags stripped and
//! whitespace collapsed. They are tailored to one page structure and make
//! no attempt at general HTML parsing.

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Class tokens that hold the result text, in priority order.
pub const RESULT_CLASSES: [&str; 6] =
    ["alert__content", "alert", "result", "status", "ipc-result", "application-status"];

/// Elements without content.
const VOID_ELEMENTS: [&str; 8] = ["input", "br", "img", "meta", "link", "hr", "source", "wbr"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Opening tag located in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTag {
    /// Lower-case tag name.
    pub name: String,
    /// Raw attribute text.
    pub attrs: String,
    /// Byte offset of `<`.
    pub start: usize,
    /// Byte offset just past `>`.
    pub end: usize,
}

impl OpenTag {
    /// Returns an attribute value, matching the name case-insensitively.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        attr_value(&self.attrs, name)
    }

    /// Returns true when the class attribute contains `token`.
    #[must_use]
    pub fn has_class(&self, token: &str) -> bool {
        self.attr("class").is_some_and(|classes| {
            classes.split_ascii_whitespace().any(|class| class.eq_ignore_ascii_case(token))
        })
    }
}

// ============================================================================
// SECTION: Scanning
// ============================================================================

/// Returns every opening tag in document order.
#[must_use]
pub fn open_tags(html: &str) -> Vec<OpenTag> {
    let mut tags = Vec::new();
    let bytes = html.as_bytes();
    let mut index = 0;
    while let Some(rel) = html[index ..].find('<') {
        let start = index + rel;
        let Some(close_rel) = html[start ..].find('>') else {
            break;
        };
        let end = start + close_rel + 1;
        let inner = &html[start + 1 .. end - 1];
        index = end;
        let Some(first) = bytes.get(start + 1) else {
            break;
        };
        if !first.is_ascii_alphabetic() {
            continue;
        }
        let name_len = inner
            .find(|ch: char| ch.is_ascii_whitespace() || ch == '/')
            .unwrap_or(inner.len());
        let name = inner[.. name_len].to_ascii_lowercase();
        let attrs = inner[name_len ..].trim_end_matches('/').trim().to_string();
        tags.push(OpenTag {
            name,
            attrs,
            start,
            end,
        });
    }
    tags
}

/// Returns the inner HTML of the element opened by `tag`.
#[must_use]
pub fn element_inner<'a>(html: &'a str, tag: &OpenTag) -> Option<&'a str> {
    if VOID_ELEMENTS.contains(&tag.name.as_str()) {
        return Some("");
    }
    let lower = html.to_ascii_lowercase();
    let open_pat = format!("<{}", tag.name);
    let close_pat = format!("</{}", tag.name);
    let mut depth = 1_usize;
    let mut cursor = tag.end;
    loop {
        let next_close = lower[cursor ..].find(&close_pat).map(|rel| cursor + rel)?;
        let next_open = lower[cursor ..]
            .match_indices(&open_pat)
            .map(|(rel, _)| cursor + rel)
            .find(|&pos| is_tag_boundary(&lower, pos + open_pat.len()));
        match next_open {
            Some(open) if open < next_close => {
                depth += 1;
                cursor = open + open_pat.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return html.get(tag.end .. next_close);
                }
                cursor = next_close + close_pat.len();
            }
        }
    }
}

/// Returns the first non-empty result text on the page.
#[must_use]
pub fn extract_result_text(html: &str) -> Option<String> {
    let tags = open_tags(html);
    let class_matches =
        RESULT_CLASSES.iter().flat_map(|class| tags.iter().filter(move |tag| tag.has_class(class)));
    let role_matches = tags.iter().filter(|tag| {
        tag.attr("role").is_some_and(|role| role.eq_ignore_ascii_case("alert"))
    });
    let live_matches = tags.iter().filter(|tag| tag.attr("aria-live").is_some());
    class_matches
        .chain(role_matches)
        .chain(live_matches)
        .filter_map(|tag| element_inner(html, tag))
        .map(visible_text)
        .find(|text| !text.is_empty())
}

/// Returns true when the page has an input named `name`.
#[must_use]
pub fn has_input(html: &str, name: &str) -> bool {
    open_tags(html).iter().any(|tag| {
        tag.name == "input" && tag.attr("name").is_some_and(|value| value == name)
    })
}

/// Returns the action and hidden inputs of the form containing `input_name`.
#[must_use]
pub fn form_for_input(html: &str, input_name: &str) -> Option<(Option<String>, Vec<(String, String)>)> {
    let tags = open_tags(html);
    for form in tags.iter().filter(|tag| tag.name == "form") {
        let Some(inner) = element_inner(html, form) else {
            continue;
        };
        let inner_tags = open_tags(inner);
        let has_field = inner_tags.iter().any(|tag| {
            tag.name == "input" && tag.attr("name").is_some_and(|value| value == input_name)
        });
        if !has_field {
            continue;
        }
        let hidden = inner_tags
            .iter()
            .filter(|tag| {
                tag.name == "input"
                    && tag.attr("type").is_some_and(|kind| kind.eq_ignore_ascii_case("hidden"))
            })
            .filter_map(|tag| Some((tag.attr("name")?, tag.attr("value").unwrap_or_default())))
            .collect();
        return Some((form.attr("action"), hidden));
    }
    None
}

// ============================================================================
// SECTION: Text
// ============================================================================

/// Removes tags, decodes common entities, and collapses whitespace.
#[must_use]
pub fn visible_text(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    let decoded = decode_entities(&out);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decodes the handful of entities the portal emits.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when `pos` ends a tag name.
fn is_tag_boundary(lower: &str, pos: usize) -> bool {
    lower[pos ..]
        .chars()
        .next()
        .is_none_or(|ch| ch.is_ascii_whitespace() || ch == '>' || ch == '/')
}

/// Parses one attribute value out of raw attribute text.
fn attr_value(attrs: &str, name: &str) -> Option<String> {
    let mut rest = attrs;
    while !rest.is_empty() {
        rest = rest.trim_start();
        let key_len = rest
            .find(|ch: char| ch == '=' || ch.is_ascii_whitespace())
            .unwrap_or(rest.len());
        if key_len == 0 {
            rest = rest.get(1 ..)?;
            continue;
        }
        let key = &rest[.. key_len];
        rest = rest[key_len ..].trim_start();
        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remaining) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1 ..];
                    let close = body.find(quote).unwrap_or(body.len());
                    (&body[.. close], body.get(close + 1 ..).unwrap_or(""))
                }
                _ => {
                    let close = after_eq.find(|ch: char| ch.is_ascii_whitespace()).unwrap_or(after_eq.len());
                    (&after_eq[.. close], &after_eq[close ..])
                }
            };
            rest = remaining;
            value
        } else {
            ""
        };
        if key.eq_ignore_ascii_case(name) {
            return Some(decode_entities(value));
        }
    }
    None
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_alert_content_with_nested_markup() {
        let html = r#"<html><body><div class="alert alert--info"><div class="alert__content"><p>Your application is <b>still</b> in proceedings.</p></div></div></body></html>"#;
        assert_eq!(
            extract_result_text(html).as_deref(),
            Some("Your application is still in proceedings.")
        );
    }

    #[test]
    fn falls_back_to_role_alert() {
        let html = r#"<section role="alert">  Application not found&nbsp;</section>"#;
        assert_eq!(extract_result_text(html).as_deref(), Some("Application not found"));
    }

    #[test]
    fn empty_containers_are_skipped() {
        let html = r#"<div class="alert__content"> </div><div aria-live="polite">Granted</div>"#;
        assert_eq!(extract_result_text(html).as_deref(), Some("Granted"));
    }

    #[test]
    fn no_result_yields_none() {
        assert_eq!(extract_result_text("<form><input name='visaApplicationNumber'></form>"), None);
    }

    #[test]
    fn finds_form_action_and_hidden_fields() {
        let html = r#"<form method="post" action="/en/status"><input type="hidden" name="_token" value="abc"><input name="visaApplicationNumber" type="text"></form>"#;
        assert!(has_input(html, "visaApplicationNumber"));
        let (action, hidden) = form_for_input(html, "visaApplicationNumber").unwrap_or_default();
        assert_eq!(action.as_deref(), Some("/en/status"));
        assert_eq!(hidden, vec![("_token".to_string(), "abc".to_string())]);
    }

    #[test]
    fn nested_same_name_elements_balance() {
        let html = "<div class=\"result\"><div>inner</div> tail</div><div>after</div>";
        let tags = open_tags(html);
        let inner = element_inner(html, &tags[0]).unwrap_or_default();
        assert_eq!(inner, "<div>inner</div> tail");
    }
}
