//! Label-driven form field resolution
//!
//! A field mapping names a field by its human-visible labels, not by exact
//! selectors; the page decides what those labels actually attach to. The
//! first label that yields a visible match wins (first-match, not
//! best-match), and each probe carries a short visibility budget so the
//! whole cascade stays bounded at roughly labels x probes x timeout.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;
use tracing::{debug, trace};

use crate::dom;
use crate::locate::{find_clickable, text_matches_contains};
use crate::plan::FieldKind;

/// Per-probe visibility budget.
const PROBE_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(1);

/// Marker attribute used to hand a JS-resolved element back to the driver,
/// which can only address elements through selectors.
const MARKER_ATTR: &str = "data-formpilot-hit";

/// Probes for one label, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldProbe {
    /// An associated `<label>` element found by text, resolved through its
    /// `for`-target or the nearest input inside the same parent.
    LabelText,
    /// Direct CSS probe against the control itself.
    Css(String),
}

pub(crate) fn field_probes(label: &str) -> Vec<FieldProbe> {
    let esc = dom::escape_css_string(label);
    let token = dom::attr_name_token(label);
    vec![
        FieldProbe::LabelText,
        FieldProbe::Css(format!(r#"input[placeholder*="{esc}"]"#)),
        FieldProbe::Css(format!(r#"textarea[placeholder*="{esc}"]"#)),
        FieldProbe::Css(format!(r#"input[name*="{token}"], input[id*="{token}"]"#)),
        FieldProbe::Css(format!(r#"textarea[name*="{token}"], textarea[id*="{token}"]"#)),
        FieldProbe::Css(format!(r#"select[name*="{token}"], select[id*="{token}"]"#)),
    ]
}

/// Resolve a form field by its candidate labels.
///
/// Primary labels walk the field-specific cascade. If none resolve, the
/// fallback labels are routed through the general clickable resolver
/// instead, since they are usually button/link anchors rather than labels.
/// Returns `None` when exhausted; the caller decides whether that is fatal.
pub async fn find_element_by_label(
    page: &Page,
    labels: &[String],
    fallback_labels: &[String],
    field_kind: FieldKind,
) -> Option<Element> {
    for label in labels {
        if label.trim().is_empty() {
            continue;
        }
        for probe in field_probes(label) {
            match try_probe(page, &probe, label).await {
                Some(element) => {
                    debug!(label, field = ?field_kind, probe = ?probe, "field resolved");
                    return Some(element);
                }
                None => trace!(label, probe = ?probe, "probe missed"),
            }
        }
    }

    for label in fallback_labels {
        if label.trim().is_empty() {
            continue;
        }
        if let Some(element) = find_clickable(page, label).await {
            if dom::wait_visible(&element, PROBE_VISIBILITY_TIMEOUT).await {
                debug!(label, "field resolved via fallback label");
                return Some(element);
            }
        }
    }

    None
}

async fn try_probe(page: &Page, probe: &FieldProbe, label: &str) -> Option<Element> {
    match probe {
        FieldProbe::LabelText => resolve_via_label_element(page, label).await,
        FieldProbe::Css(selector) => {
            let elements = page.find_elements(selector.as_str()).await.ok()?;
            for element in elements {
                if dom::wait_visible(&element, PROBE_VISIBILITY_TIMEOUT).await {
                    return Some(element);
                }
            }
            None
        }
    }
}

/// Find a visible `<label>` whose text mentions the label string, then hop
/// to the control it describes: the `for`-target if present, otherwise the
/// first input/textarea/select under the same parent.
async fn resolve_via_label_element(page: &Page, label: &str) -> Option<Element> {
    let labels = page.find_elements("label").await.ok()?;
    for label_el in labels {
        let Some(text) = dom::inner_text(&label_el).await else {
            continue;
        };
        if !text_matches_contains(&text, label) {
            continue;
        }
        if !dom::wait_visible(&label_el, PROBE_VISIBILITY_TIMEOUT).await {
            continue;
        }

        let marked = dom::eval_bool(&label_el, MARK_TARGET_JS).await.unwrap_or(false);
        if !marked {
            continue;
        }
        let found = page.find_element(format!("[{MARKER_ATTR}]")).await.ok();
        if let Some(element) = &found {
            let _ = element.call_js_fn(CLEAR_MARKER_JS, false).await;
        }
        if found.is_some() {
            return found;
        }
    }
    None
}

const MARK_TARGET_JS: &str = "function() { \
    const forId = this.getAttribute('for'); \
    let input = forId ? document.getElementById(forId) : null; \
    if (!input) { \
        const scope = this.parentElement; \
        input = scope ? scope.querySelector('input, textarea, select') : null; \
    } \
    if (!input) return false; \
    input.setAttribute('data-formpilot-hit', ''); \
    return true; \
}";

const CLEAR_MARKER_JS: &str = "function() { this.removeAttribute('data-formpilot-hit'); }";

#[cfg(test)]
mod tests {
    use super::*;

    // Strategy priority: associated label first, then placeholder, then
    // normalized name/id probes, each widening the net.
    #[test]
    fn probe_order_is_label_then_placeholder_then_name() {
        let probes = field_probes("First Name");
        assert_eq!(probes[0], FieldProbe::LabelText);
        assert!(matches!(
            &probes[1],
            FieldProbe::Css(s) if s.contains("placeholder") && s.contains("First Name")
        ));
        let name_probe_index = probes
            .iter()
            .position(|p| matches!(p, FieldProbe::Css(s) if s.contains("first_name")))
            .unwrap();
        assert!(name_probe_index > 1);
    }

    #[test]
    fn name_probes_cover_input_textarea_select() {
        let probes = field_probes("Amount");
        let css: Vec<&String> = probes
            .iter()
            .filter_map(|p| match p {
                FieldProbe::Css(s) => Some(s),
                _ => None,
            })
            .collect();
        assert!(css.iter().any(|s| s.starts_with("input[name")));
        assert!(css.iter().any(|s| s.starts_with("textarea[name")));
        assert!(css.iter().any(|s| s.starts_with("select[name")));
    }

    #[test]
    fn placeholder_probe_keeps_original_casing() {
        let probes = field_probes("Email Address");
        assert!(matches!(
            &probes[1],
            FieldProbe::Css(s) if s.contains(r#"placeholder*="Email Address""#)
        ));
    }
}
