//! Element resolution against a live, uncontrolled DOM
//!
//! Two resolvers share this module: a label-driven field locator for form
//! inputs and a free-text/selector resolver for clickable targets. Both are
//! prioritized strategy chains: cheap, specific probes first, broad scans
//! last, each with its own short timeout so one exhausted strategy degrades
//! to "try the next" instead of stalling the run.

mod clickable;
mod element;

pub use clickable::{click_by_text_or_selector, find_clickable};
pub use element::find_element_by_label;

/// Exact text match: trimmed, case-insensitive.
pub(crate) fn text_matches_exact(haystack: &str, needle: &str) -> bool {
    haystack.trim().to_lowercase() == needle.trim().to_lowercase()
}

/// Exact match tolerating incidental interior whitespace (icon paddings,
/// wrapped markup). Still an exact match on the word sequence.
pub(crate) fn text_matches_exact_relaxed(haystack: &str, needle: &str) -> bool {
    collapse_whitespace(haystack).to_lowercase() == collapse_whitespace(needle).to_lowercase()
}

/// Case-insensitive substring match. Only ever a candidate *generator*: a
/// contains-hit must be re-validated against the exact matcher on the full
/// text before a tier may accept it.
pub(crate) fn text_matches_contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

pub(crate) fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_is_case_insensitive_and_trimmed() {
        assert!(text_matches_exact("  Save ", "save"));
        assert!(!text_matches_exact("Save Changes", "Save"));
    }

    #[test]
    fn relaxed_exact_collapses_interior_whitespace() {
        assert!(text_matches_exact_relaxed("Save\n  Changes", "Save Changes"));
        assert!(!text_matches_exact_relaxed("Save Changes", "Save"));
    }

    // The exact-match gate: "Save" must never pass an exact tier against a
    // "Save Changes" button, while the contains matcher may surface it as a
    // candidate that the gate then rejects.
    #[test]
    fn contains_generates_but_exact_gates() {
        let button_text = "Save Changes";
        let target = "Save";
        assert!(text_matches_contains(button_text, target));
        assert!(!text_matches_exact(button_text, target));
        assert!(!text_matches_exact_relaxed(button_text, target));
    }
}
