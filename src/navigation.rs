//! Pre-plan navigation steps
//!
//! A short imperative script that moves the page from its landing state to
//! the form the plan targets. Steps run strictly in order; any step failing
//! aborts the run before a single row executes.

use std::time::Duration;

use chromiumoxide::Page;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::indicators::{self, INDICATOR_TIMEOUT};
use crate::locate::find_clickable;
use crate::plan::{NavigationStep, NavigationStepKind};
use crate::session;

const STEP_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn perform_navigation(page: &Page, steps: &[NavigationStep]) -> EngineResult<()> {
    for (index, step) in steps.iter().enumerate() {
        info!(step = index + 1, total = steps.len(), kind = ?step.kind, "navigation step");
        match step.kind {
            NavigationStepKind::Click => {
                let target = step.target.as_deref().unwrap_or_default();
                let element = find_clickable(page, target).await.ok_or_else(|| {
                    EngineError::Navigation(format!("click target not found: {target}"))
                })?;
                element.click().await?;
                if let Some(indicator) = &step.wait_for {
                    indicators::wait_for_indicator(page, indicator, INDICATOR_TIMEOUT).await?;
                }
            }
            NavigationStepKind::Navigate => {
                let url = step.target.as_deref().ok_or_else(|| {
                    EngineError::Navigation("navigate step has no target url".into())
                })?;
                session::goto(page, url, STEP_NAVIGATION_TIMEOUT).await?;
            }
            NavigationStepKind::Wait => {
                let seconds = step.duration.unwrap_or(1.0);
                tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_step_defaults_to_one_second() {
        let step: NavigationStep = serde_json::from_value(serde_json::json!({
            "type": "wait"
        }))
        .unwrap();
        assert_eq!(step.duration.unwrap_or(1.0), 1.0);
    }

    #[test]
    fn click_step_deserializes_with_wait_for() {
        let step: NavigationStep = serde_json::from_value(serde_json::json!({
            "type": "click",
            "target": "Transactions",
            "waitFor": { "type": "selector", "value": "#tx-form" }
        }))
        .unwrap();
        assert!(matches!(step.kind, NavigationStepKind::Click));
        assert!(step.wait_for.is_some());
    }
}
