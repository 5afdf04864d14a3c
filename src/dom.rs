//! Element-level DOM predicates evaluated over CDP
//!
//! The driver only exposes CSS queries and raw JS evaluation on elements, so
//! visibility/enabled checks run as small JS functions against the element.
//! Everything here is best-effort: a failed CDP round-trip reads as "no".

use std::time::Duration;

use chromiumoxide::element::Element;

/// Computed-style visibility check. An element that exists in the DOM but is
/// collapsed, `display: none` or `visibility: hidden` does not count.
const VISIBLE_JS: &str = "function() { \
    const rect = this.getBoundingClientRect(); \
    if (rect.width <= 0 || rect.height <= 0) return false; \
    const style = window.getComputedStyle(this); \
    return style.display !== 'none' && style.visibility !== 'hidden'; \
}";

const ENABLED_JS: &str = "function() { return !this.disabled; }";

/// Run a zero-argument JS function against the element, expecting a boolean.
pub(crate) async fn eval_bool(element: &Element, function: &str) -> Option<bool> {
    element
        .call_js_fn(function, false)
        .await
        .ok()
        .and_then(|ret| ret.result.value)
        .and_then(|v| v.as_bool())
}

pub(crate) async fn is_visible(element: &Element) -> bool {
    eval_bool(element, VISIBLE_JS).await.unwrap_or(false)
}

/// Poll visibility until `timeout` elapses. Mirrors the driver-side
/// "visible within N ms" contract the locator cascades rely on; the short
/// per-strategy budget is what keeps worst-case cascade latency bounded.
pub(crate) async fn wait_visible(element: &Element, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    loop {
        if is_visible(element).await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Enabled check that defaults to enabled when the probe itself errors; an
/// ambiguous answer must not disqualify an otherwise valid candidate.
pub(crate) async fn is_enabled(element: &Element) -> bool {
    eval_bool(element, ENABLED_JS).await.unwrap_or(true)
}

pub(crate) async fn inner_text(element: &Element) -> Option<String> {
    element.inner_text().await.ok().flatten()
}

pub(crate) async fn attribute(element: &Element, name: &str) -> Option<String> {
    element.attribute(name).await.ok().flatten()
}

/// Escape a value for embedding inside a double-quoted CSS attribute string.
pub(crate) fn escape_css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Normalized form of a label used for name/id substring probes:
/// lowercased, whitespace runs collapsed to a single underscore.
pub(crate) fn attr_name_token(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut in_ws = false;
    for ch in label.trim().chars() {
        if ch.is_whitespace() {
            in_ws = true;
        } else {
            if in_ws && !out.is_empty() {
                out.push('_');
            }
            in_ws = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_string_escaping() {
        assert_eq!(escape_css_string(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_css_string(r"a\b"), r"a\\b");
        assert_eq!(escape_css_string("plain"), "plain");
    }

    #[test]
    fn attr_token_lowercases_and_joins() {
        assert_eq!(attr_name_token("First Name"), "first_name");
        assert_eq!(attr_name_token("  Billing   Address "), "billing_address");
        assert_eq!(attr_name_token("Email"), "email");
    }
}
