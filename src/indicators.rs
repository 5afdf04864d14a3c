//! Indicator evaluation: readiness, success and failure detection
//!
//! The same `{type, value}` shape serves two contracts: `check_indicator` is
//! a non-throwing one-shot predicate (internal errors collapse to `false`),
//! while the wait variants poll it and error on deadline. Selector and text
//! checks require a VISIBLE match; an element that is merely present in the
//! DOM does not count. URL checks use substring containment to tolerate
//! query-string variance.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::trace;

use crate::dom;
use crate::error::{EngineError, EngineResult};
use crate::plan::{Indicator, IndicatorKind};

/// Long wait reserved for initial navigation.
pub const PAGE_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Default wait for mid-flow indicator waits.
pub const INDICATOR_TIMEOUT: Duration = Duration::from_secs(10);
/// Visibility budget of a single one-shot check.
const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// One-shot predicate over page state. Never errors; anything that goes
/// wrong while probing reads as "not satisfied".
pub async fn check_indicator(page: &Page, indicator: &Indicator) -> bool {
    match indicator.kind {
        IndicatorKind::Selector => match page.find_element(indicator.value.as_str()).await {
            Ok(element) => dom::wait_visible(&element, CHECK_TIMEOUT).await,
            Err(e) => {
                trace!(selector = %indicator.value, error = %e, "selector indicator missed");
                false
            }
        },
        IndicatorKind::Text => visible_text_present(page, &indicator.value).await,
        IndicatorKind::Url => match page.url().await {
            Ok(Some(url)) => url.contains(&indicator.value),
            _ => false,
        },
    }
}

/// Block until the indicator is satisfied, polling with backoff. Errors with
/// an indicator timeout once the deadline passes.
pub async fn wait_for_indicator(
    page: &Page,
    indicator: &Indicator,
    timeout: Duration,
) -> EngineResult<()> {
    let start = std::time::Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        if check_indicator(page, indicator).await {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(EngineError::IndicatorTimeout {
                what: describe(indicator),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(poll_interval).await;
        poll_interval = (poll_interval * 2).min(max_interval);
    }
}

/// The same wait with the long timeout reserved for initial page loads.
pub async fn wait_for_page_ready(
    page: &Page,
    indicator: &Indicator,
    timeout: Duration,
) -> EngineResult<()> {
    wait_for_indicator(page, indicator, timeout).await
}

fn describe(indicator: &Indicator) -> String {
    let kind = match indicator.kind {
        IndicatorKind::Selector => "selector",
        IndicatorKind::Text => "text",
        IndicatorKind::Url => "url",
    };
    format!("indicator {kind}={}", indicator.value)
}

/// Walk the page's text nodes for a case-insensitive match attached to a
/// visible element. Runs fully in-page; one CDP round-trip per check.
async fn visible_text_present(page: &Page, needle: &str) -> bool {
    let Ok(needle_literal) = serde_json::to_string(needle) else {
        return false;
    };
    let expr = format!(
        "(() => {{ \
            if (!document.body) return false; \
            const needle = {needle_literal}.toLowerCase(); \
            const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT); \
            while (walker.nextNode()) {{ \
                const node = walker.currentNode; \
                if (!node.textContent.toLowerCase().includes(needle)) continue; \
                const el = node.parentElement; \
                if (!el) continue; \
                const rect = el.getBoundingClientRect(); \
                if (rect.width <= 0 || rect.height <= 0) continue; \
                const style = window.getComputedStyle(el); \
                if (style.display === 'none' || style.visibility === 'hidden') continue; \
                return true; \
            }} \
            return false; \
        }})()"
    );

    page.evaluate(expr)
        .await
        .ok()
        .and_then(|result| result.value().cloned())
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
