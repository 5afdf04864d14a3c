//! Keystroke-paced text entry
//!
//! Some target pages run keystroke-driven validation or input masks that a
//! single bulk value-set bypasses entirely; per-character typing with jitter
//! also reads less like scripted input.

use std::time::Duration;

use chromiumoxide::element::Element;
use rand::Rng;

use crate::error::EngineResult;

/// Inter-character delay bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingPacing {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for TypingPacing {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 150,
        }
    }
}

impl TypingPacing {
    /// Draw one inter-character delay, uniform over the configured bounds.
    fn jitter(&self) -> Duration {
        let (lo, hi) = if self.min_delay_ms <= self.max_delay_ms {
            (self.min_delay_ms, self.max_delay_ms)
        } else {
            (self.max_delay_ms, self.min_delay_ms)
        };
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

const CLEAR_VALUE_JS: &str = "function() { \
    this.value = ''; \
    this.dispatchEvent(new Event('input', { bubbles: true })); \
}";

/// Clear the element, focus it, then emit the text one character at a time
/// with randomized pacing. Empty text is a no-op with no clear/focus side
/// effects.
pub async fn human_type(element: &Element, text: &str, pacing: TypingPacing) -> EngineResult<()> {
    if text.is_empty() {
        return Ok(());
    }

    element.call_js_fn(CLEAR_VALUE_JS, false).await?;
    element.focus().await?;

    for ch in text.chars() {
        element.type_str(ch.to_string()).await?;
        tokio::time::sleep(pacing.jitter()).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let pacing = TypingPacing {
            min_delay_ms: 50,
            max_delay_ms: 150,
        };
        for _ in 0..100 {
            let d = pacing.jitter().as_millis() as u64;
            assert!((50..=150).contains(&d));
        }
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let pacing = TypingPacing {
            min_delay_ms: 200,
            max_delay_ms: 100,
        };
        let d = pacing.jitter().as_millis() as u64;
        assert!((100..=200).contains(&d));
    }

    #[test]
    fn default_pacing_matches_human_range() {
        let pacing = TypingPacing::default();
        assert_eq!(pacing.min_delay_ms, 50);
        assert_eq!(pacing.max_delay_ms, 150);
    }
}
