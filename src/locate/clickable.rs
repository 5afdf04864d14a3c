//! Clickable target resolution and click execution
//!
//! The target string is ambiguous on purpose: it may be a literal CSS
//! selector, a button caption, a link label, or the accessible name of an
//! icon-only control. The resolver runs a fixed, data-driven chain of
//! probes ordered from most semantically precise to most permissive; the
//! first candidate that survives validation wins. Every probe failure is
//! traced and swallowed so the chain keeps moving.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;
use tracing::{debug, trace};

use crate::dom;
use crate::error::{EngineError, EngineResult};
use crate::locate::{text_matches_contains, text_matches_exact, text_matches_exact_relaxed};

/// Button-like elements by role semantics.
const BUTTON_GROUP: &str = "button, [role='button'], input[type='submit'], input[type='button']";
/// Link-like elements by role semantics.
const LINK_GROUP: &str = "a, [role='link']";

/// Cap on brute-force scans; bounds cost on pages with very large control
/// counts.
const BRUTE_FORCE_CAP: usize = 50;

/// Cap on every other enumerating tier. Each inspected element costs CDP
/// round-trips, so no scan may walk an unbounded control list.
const SCAN_CAP: usize = 50;

/// Icon classes commonly used on icon-only edit/delete buttons, which carry
/// no text node at all.
const ICON_CLASSES: [&str; 6] = [
    "i.bi-trash",
    "i.bi-pencil",
    "i.bi-x",
    "i.bi-check",
    "i.fa-trash",
    "i.fa-pencil",
];

/// How a probe matches a scanned element against the target text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Matcher {
    /// Accessible name (text, `title`, `aria-label` or `value`) exact.
    NameExact,
    /// Accessible name exact after whitespace collapse.
    NameExactRelaxed,
    /// Visible text exact.
    TextExact,
    /// Contains generates the candidate, exact on the full text gates it.
    TextContainsRevalidated,
    /// Contains over the accessible name, gated by exact on the full text.
    NameContainsRevalidated,
    /// Lowercased `title`/`aria-label` equality or containment.
    AttrCaseInsensitive,
    /// `title`/`aria-label` contains, or text exact. Last resort.
    BruteForce,
}

/// One entry of the resolution chain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Probe {
    /// querySelector the given CSS and take the first hit.
    Css(String),
    /// Enumerate elements matching `group` and apply `matcher`.
    Scan {
        group: &'static str,
        matcher: Matcher,
        cap: usize,
    },
}

fn scan(group: &'static str, matcher: Matcher) -> (&'static str, Probe) {
    let name = match (group, matcher) {
        (BUTTON_GROUP, Matcher::NameExact) => "button-name-exact",
        (BUTTON_GROUP, Matcher::NameExactRelaxed) => "button-name-exact-relaxed",
        (BUTTON_GROUP, Matcher::NameContainsRevalidated) => "button-name-contains",
        (BUTTON_GROUP, Matcher::AttrCaseInsensitive) => "button-attr-ci",
        (BUTTON_GROUP, Matcher::BruteForce) => "button-brute-force",
        (LINK_GROUP, Matcher::NameExact) => "link-name-exact",
        (LINK_GROUP, Matcher::NameExactRelaxed) => "link-name-exact-relaxed",
        (LINK_GROUP, Matcher::NameContainsRevalidated) => "link-name-contains",
        ("button", Matcher::TextExact) => "button-text-exact",
        ("button", Matcher::TextContainsRevalidated) => "button-text-contains",
        ("a", Matcher::TextExact) => "link-text-exact",
        ("a", Matcher::TextContainsRevalidated) => "link-text-contains",
        ("[role='button']", Matcher::TextExact) => "role-button-text-exact",
        ("[role='button']", Matcher::TextContainsRevalidated) => "role-button-text-contains",
        ("[role='menuitem']", Matcher::TextContainsRevalidated) => "menuitem-text-contains",
        _ => "scan",
    };
    (
        name,
        Probe::Scan {
            group,
            matcher,
            cap: SCAN_CAP,
        },
    )
}

/// Build the resolution chain for one target, in priority order.
///
/// Ordering matters: semantically precise probes (role + exact accessible
/// name) come before permissive ones (attribute substrings, brute-force
/// scans), buttons before links, and every contains family sits behind its
/// exact counterpart.
fn build_probes(target: &str) -> Vec<(&'static str, Probe)> {
    let esc = dom::escape_css_string(target);
    let probes = vec![
        // Literal CSS selector interpretation.
        ("literal-css", Probe::Css(target.to_string())),
        // Button tiers: exact first, contains (revalidated) after.
        scan(BUTTON_GROUP, Matcher::NameExact),
        scan(BUTTON_GROUP, Matcher::NameExactRelaxed),
        scan("button", Matcher::TextExact),
        scan(BUTTON_GROUP, Matcher::NameContainsRevalidated),
        scan("button", Matcher::TextContainsRevalidated),
        // Icon-only buttons expose their name through title/aria-label.
        (
            "button-title-exact",
            Probe::Css(format!(r#"button[title="{esc}" i]"#)),
        ),
        (
            "button-aria-exact",
            Probe::Css(format!(r#"button[aria-label="{esc}" i]"#)),
        ),
        (
            "button-title-contains",
            Probe::Css(format!(r#"button[title*="{esc}" i]"#)),
        ),
        (
            "button-aria-contains",
            Probe::Css(format!(r#"button[aria-label*="{esc}" i]"#)),
        ),
        // Legacy inline-handler apps: onclick="deleteRecord('ID')".
        (
            "button-onclick",
            Probe::Css(format!(r#"button[onclick*="{esc}" i]"#)),
        ),
        ("icon-ancestor", icon_ancestor_probe(&esc)),
        scan(BUTTON_GROUP, Matcher::AttrCaseInsensitive),
        (
            "button-brute-force",
            Probe::Scan {
                group: "button",
                matcher: Matcher::BruteForce,
                cap: BRUTE_FORCE_CAP,
            },
        ),
        // Link tiers mirror the button tiers.
        scan(LINK_GROUP, Matcher::NameExact),
        scan(LINK_GROUP, Matcher::NameExactRelaxed),
        scan(LINK_GROUP, Matcher::NameContainsRevalidated),
        // Submit/button inputs carry their caption in `value`.
        (
            "submit-input-value",
            Probe::Css(format!(r#"input[type="submit"][value="{esc}" i]"#)),
        ),
        (
            "button-input-value",
            Probe::Css(format!(r#"input[type="button"][value="{esc}" i]"#)),
        ),
        // Text wrapped in non-semantic markup inside a clickable ancestor;
        // inner text includes descendant text nodes, so exact text over the
        // clickable groups covers the climb.
        scan("[role='button']", Matcher::TextExact),
        scan("a", Matcher::TextExact),
        scan("[role='menuitem']", Matcher::TextContainsRevalidated),
    ];
    probes
}

/// Buttons wrapping a known icon class (or an svg named via title/aria);
/// the ancestor button's own title/aria-label must still match.
fn icon_ancestor_probe(escaped_target: &str) -> Probe {
    let mut parts: Vec<String> = Vec::with_capacity(ICON_CLASSES.len() * 2 + 2);
    for icon in ICON_CLASSES {
        parts.push(format!(
            r#"button[title*="{escaped_target}" i]:has({icon})"#
        ));
        parts.push(format!(
            r#"button[aria-label*="{escaped_target}" i]:has({icon})"#
        ));
    }
    parts.push(format!(r#"button:has(svg[title="{escaped_target}" i])"#));
    parts.push(format!(r#"button:has(svg[aria-label="{escaped_target}" i])"#));
    Probe::Css(parts.join(", "))
}

/// Resolve a click target to a validated element, or `None` after the whole
/// chain is exhausted. Never errors: resolution failure is the caller's
/// decision to escalate.
pub async fn find_clickable(page: &Page, target: &str) -> Option<Element> {
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    for (name, probe) in build_probes(target) {
        match run_probe(page, &probe, target).await {
            Ok(Some(element)) => {
                debug!(strategy = name, target, "clickable target resolved");
                return Some(element);
            }
            Ok(None) => trace!(strategy = name, target, "no validated candidate"),
            Err(e) => debug!(strategy = name, target, error = %e, "strategy errored; trying next"),
        }
    }
    None
}

async fn run_probe(page: &Page, probe: &Probe, target: &str) -> EngineResult<Option<Element>> {
    match probe {
        Probe::Css(selector) => {
            let Ok(element) = page.find_element(selector.as_str()).await else {
                return Ok(None);
            };
            if validate(&element).await {
                Ok(Some(element))
            } else {
                Ok(None)
            }
        }
        Probe::Scan {
            group,
            matcher,
            cap,
        } => {
            let elements = match page.find_elements(*group).await {
                Ok(elements) => elements,
                Err(_) => return Ok(None),
            };
            for element in elements.into_iter().take(*cap) {
                if matches(&element, *matcher, target).await && validate(&element).await {
                    return Ok(Some(element));
                }
            }
            Ok(None)
        }
    }
}

async fn matches(element: &Element, matcher: Matcher, target: &str) -> bool {
    match matcher {
        Matcher::TextExact => dom::inner_text(element)
            .await
            .is_some_and(|t| text_matches_exact(&t, target)),
        Matcher::TextContainsRevalidated => dom::inner_text(element).await.is_some_and(|t| {
            // Contains surfaces the candidate; exact on the full text gates
            // it, so a short target never claims a longer caption.
            text_matches_contains(&t, target) && text_matches_exact(t.trim(), target)
        }),
        Matcher::NameExact => accessible_name(element)
            .await
            .is_some_and(|n| text_matches_exact(&n, target)),
        Matcher::NameExactRelaxed => accessible_name(element)
            .await
            .is_some_and(|n| text_matches_exact_relaxed(&n, target)),
        Matcher::NameContainsRevalidated => accessible_name(element).await.is_some_and(|n| {
            text_matches_contains(&n, target) && text_matches_exact_relaxed(&n, target)
        }),
        Matcher::AttrCaseInsensitive => {
            for attr in ["title", "aria-label"] {
                if let Some(value) = dom::attribute(element, attr).await
                    && (text_matches_exact(&value, target)
                        || text_matches_contains(&value, target))
                {
                    return true;
                }
            }
            false
        }
        Matcher::BruteForce => {
            for attr in ["title", "aria-label"] {
                if let Some(value) = dom::attribute(element, attr).await
                    && text_matches_contains(&value, target)
                {
                    return true;
                }
            }
            dom::inner_text(element)
                .await
                .is_some_and(|t| text_matches_exact(&t, target))
        }
    }
}

/// Accessible name approximation: visible text, else `title`, `aria-label`
/// or `value` for icon-only and input-based buttons.
async fn accessible_name(element: &Element) -> Option<String> {
    if let Some(text) = dom::inner_text(element).await
        && !text.trim().is_empty()
    {
        return Some(text);
    }
    for attr in ["aria-label", "title", "value"] {
        if let Some(value) = dom::attribute(element, attr).await
            && !value.trim().is_empty()
        {
            return Some(value);
        }
    }
    None
}

/// A candidate counts only if it is visible (within 2s), enabled (an errored
/// enabled-probe defaults to enabled) and passes a non-committing trial
/// click: the click point must resolve, proving the element is unobstructed
/// and scrollable into the viewport, without firing anything.
async fn validate(element: &Element) -> bool {
    if !dom::wait_visible(element, Duration::from_secs(2)).await {
        return false;
    }
    if !dom::is_enabled(element).await {
        return false;
    }
    element.clickable_point().await.is_ok()
}

const JS_CLICK: &str = "function() { this.click(); }";
const JS_DISPATCH_CLICK: &str = "function() { \
    this.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: window })); \
}";

/// Resolve and click a target, with escalating click strategies.
///
/// Order: pointer click at the computed clickable point, the driver's own
/// element click (re-scrolls and re-resolves the point), direct DOM
/// `click()`, and finally a raw synthetic event dispatch for controls whose
/// handlers ignore trusted-event plumbing. First success wins.
pub async fn click_by_text_or_selector(page: &Page, target: &str) -> EngineResult<()> {
    let Some(element) = find_clickable(page, target).await else {
        return Err(EngineError::Resolution(format!(
            "click target not found: {target}"
        )));
    };

    // Best effort only; a failed scroll must not veto the click attempts.
    if let Err(e) = element.scroll_into_view().await {
        trace!(target, error = %e, "scroll into view failed");
    }
    dom::wait_visible(&element, Duration::from_secs(5)).await;

    if let Ok(point) = element.clickable_point().await
        && page.click(point).await.is_ok()
    {
        settle().await;
        return Ok(());
    }
    if element.click().await.is_ok() {
        settle().await;
        return Ok(());
    }
    if element.call_js_fn(JS_CLICK, false).await.is_ok() {
        settle().await;
        return Ok(());
    }
    if element.call_js_fn(JS_DISPATCH_CLICK, false).await.is_ok() {
        settle().await;
        return Ok(());
    }

    Err(EngineError::Resolution(format!(
        "failed to click target: {target}"
    )))
}

/// Give the page a beat to process the click before the next action runs.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(500)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(target: &str) -> Vec<&'static str> {
        build_probes(target).into_iter().map(|(n, _)| n).collect()
    }

    #[test]
    fn literal_css_is_tried_first() {
        assert_eq!(names("#save")[0], "literal-css");
    }

    #[test]
    fn exact_tiers_precede_contains_tiers() {
        let names = names("Save");
        let exact = names
            .iter()
            .position(|n| *n == "button-name-exact")
            .unwrap();
        let contains = names
            .iter()
            .position(|n| *n == "button-name-contains")
            .unwrap();
        assert!(exact < contains);
    }

    #[test]
    fn buttons_precede_links_precede_text_climb() {
        let names = names("Delete");
        let button = names
            .iter()
            .position(|n| *n == "button-name-exact")
            .unwrap();
        let brute = names
            .iter()
            .position(|n| *n == "button-brute-force")
            .unwrap();
        let link = names.iter().position(|n| *n == "link-name-exact").unwrap();
        assert!(button < brute);
        assert!(brute < link);
    }

    #[test]
    fn attribute_selectors_escape_quotes() {
        let probes = build_probes(r#"Del"ete"#);
        let css: Vec<String> = probes
            .iter()
            .filter_map(|(_, p)| match p {
                Probe::Css(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert!(css.iter().any(|s| s.contains(r#"\"ete"#)));
    }

    #[test]
    fn brute_force_is_capped() {
        let probes = build_probes("Edit");
        let capped = probes.iter().any(|(n, p)| {
            *n == "button-brute-force"
                && matches!(p, Probe::Scan { cap, .. } if *cap == BRUTE_FORCE_CAP)
        });
        assert!(capped);
    }

    #[test]
    fn every_scan_tier_is_bounded() {
        for (name, probe) in build_probes("Save") {
            if let Probe::Scan { cap, .. } = probe {
                assert!(
                    cap <= BRUTE_FORCE_CAP.max(SCAN_CAP),
                    "unbounded scan tier: {name}"
                );
            }
        }
    }

    #[test]
    fn icon_ancestor_probe_covers_known_icons() {
        let Probe::Css(selector) = icon_ancestor_probe("Delete") else {
            panic!("icon probe should be a CSS probe");
        };
        assert!(selector.contains(r#"button[title*="Delete" i]:has(i.bi-trash)"#));
        assert!(selector.contains(r#"button[aria-label*="Delete" i]:has(i.fa-pencil)"#));
        assert!(selector.contains(r#"svg[aria-label="Delete" i]"#));
    }

    // A "Save" target must never resolve through an unrelated trash or
    // pencil button; every icon arm carries the target name somewhere.
    #[test]
    fn icon_arms_all_name_the_target() {
        let Probe::Css(selector) = icon_ancestor_probe("Save") else {
            panic!("icon probe should be a CSS probe");
        };
        for arm in selector.split(", ") {
            assert!(arm.contains("Save"), "icon arm does not name the target: {arm}");
        }
    }
}
