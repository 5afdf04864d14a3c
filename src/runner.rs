//! Top-level plan execution
//!
//! The runner owns the whole lifecycle of one execution: validate, launch,
//! precondition (login, navigation, page-ready), dispatch rows per the
//! execution mode, and always return a report instead of an error. Setup
//! failures produce an `error`-status report; per-row trouble is expressed
//! through row and action results.

use std::time::Instant;

use tracing::{error, info};

use crate::Config;
use crate::actions;
use crate::error::{EngineError, EngineResult};
use crate::indicators;
use crate::login;
use crate::navigation;
use crate::normalize::normalize_plan;
use crate::plan::{AutomationPlan, DataMode, RunMode};
use crate::report::{ExecutionReport, RowExecutionResult, RowStatus};
use crate::session::{self, BrowserSession};

/// Execute a plan with configuration loaded from the standard config file
/// (falling back to defaults when absent).
pub async fn execute_automation_plan(plan: &AutomationPlan) -> ExecutionReport {
    let config = crate::load_yaml_config().unwrap_or_default();
    execute_automation_plan_with_config(plan, &config).await
}

/// Execute a plan against an explicit configuration.
///
/// Never returns an error: anything that prevents the run from completing
/// comes back as a report with `error` status and a message.
pub async fn execute_automation_plan_with_config(
    plan: &AutomationPlan,
    config: &Config,
) -> ExecutionReport {
    let started = Instant::now();

    let plan = match normalize_plan(plan.clone()) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "plan rejected");
            return ExecutionReport::errored(vec![], started.elapsed().as_millis() as u64, e.to_string());
        }
    };

    let mut session = match BrowserSession::launch(config).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "browser launch failed");
            return ExecutionReport::errored(
                vec![],
                started.elapsed().as_millis() as u64,
                format!("browser session error: {e}"),
            );
        }
    };

    let outcome = run_plan(&mut session, &plan, config).await;
    session.close().await;

    let duration = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(results) => {
            let report = ExecutionReport::completed(results, duration);
            info!(status = ?report.status, rows = report.summary.total, "execution finished");
            report
        }
        Err(e) => {
            error!(error = %e, "execution aborted");
            ExecutionReport::errored(vec![], duration, e.to_string())
        }
    }
}

async fn run_plan(
    session: &mut BrowserSession,
    plan: &AutomationPlan,
    config: &Config,
) -> EngineResult<Vec<RowExecutionResult>> {
    // Install the guard before anything can open a dialog, not at the point
    // the handleDialog action executes.
    if plan.wants_dialog_guard() {
        session.install_dialog_auto_accept().await?;
    }

    if let Some(login_config) = &plan.target.login {
        login::perform_login(session.page(), login_config, config.typing_pacing()).await?;
    }

    if let Some(steps) = &plan.target.navigation
        && !steps.is_empty()
    {
        navigation::perform_navigation(session.page(), steps).await?;
    }

    info!(url = %plan.target.url, "navigating to target");
    session::goto(session.page(), &plan.target.url, config.navigation_timeout()).await?;

    let ready = plan
        .target
        .page_ready_indicator
        .as_ref()
        .filter(|i| i.is_configured())
        .ok_or_else(|| {
            EngineError::Validation("target.pageReadyIndicator must be configured".into())
        })?;
    indicators::wait_for_page_ready(session.page(), ready, config.page_ready_timeout()).await?;

    let mode = plan.execution.as_ref().map(|e| e.mode).unwrap_or_default();
    if mode == RunMode::Loop {
        let loop_config = plan
            .execution
            .as_ref()
            .and_then(|e| e.loop_config.as_ref())
            .ok_or_else(|| {
                EngineError::Validation("loop mode requires an execution.loop block".into())
            })?;
        let row = selected_row(plan)?;
        return actions::execute_actions_with_loop(session, plan, row, loop_config, config).await;
    }

    match plan.data_source.mode {
        DataMode::Batch => {
            let mut results = Vec::with_capacity(plan.data_source.rows.len());
            for (index, row) in plan.data_source.rows.iter().enumerate() {
                let result = actions::execute_actions_for_row(session, plan, row, index, config).await;
                let failed = result.status == RowStatus::Failed;
                results.push(result);

                // A live failure indicator means the page is in a state the
                // remaining rows cannot recover from.
                if failed
                    && let Some(indicator) = plan.failure_indicator()
                    && indicators::check_indicator(session.page(), indicator).await
                {
                    error!(rows_done = results.len(), "failure indicator visible; stopping batch");
                    break;
                }
            }
            Ok(results)
        }
        DataMode::Single => {
            let row = selected_row(plan)?;
            let index = plan.data_source.selected_row_index.unwrap_or(0);
            Ok(vec![
                actions::execute_actions_for_row(session, plan, row, index, config).await,
            ])
        }
    }
}

// Normalization already rejects an out-of-range selection before the browser
// launches; this guard keeps run_plan total for plans built in-process.
fn selected_row(plan: &AutomationPlan) -> EngineResult<&crate::plan::RowData> {
    let index = plan.data_source.selected_row_index.unwrap_or(0);
    plan.data_source.rows.get(index).ok_or_else(|| {
        EngineError::Validation(format!(
            "selectedRowIndex {index} out of range ({} rows)",
            plan.data_source.rows.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RowData;

    fn plan_json() -> serde_json::Value {
        serde_json::json!({
            "target": {
                "url": "https://app.example.com/form",
                "pageReadyIndicator": { "type": "selector", "value": "#form" }
            },
            "dataSource": {
                "rows": [{ "a": "1" }, { "a": "2" }],
                "mode": "single",
                "selectedRowIndex": 1
            },
            "actions": [{ "type": "click", "target": "Save" }]
        })
    }

    #[test]
    fn selected_row_honors_index() {
        let plan: AutomationPlan = serde_json::from_value(plan_json()).unwrap();
        let row = selected_row(&plan).unwrap();
        assert_eq!(row.get("a").unwrap(), "2");
    }

    #[test]
    fn selected_row_rejects_out_of_range() {
        let mut plan: AutomationPlan = serde_json::from_value(plan_json()).unwrap();
        plan.data_source.selected_row_index = Some(9);
        let err = selected_row(&plan).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn default_mode_is_once() {
        let plan: AutomationPlan = serde_json::from_value(plan_json()).unwrap();
        let mode = plan.execution.as_ref().map(|e| e.mode).unwrap_or_default();
        assert_eq!(mode, RunMode::Once);
    }

    #[test]
    fn selected_row_defaults_to_first() {
        let mut plan: AutomationPlan = serde_json::from_value(plan_json()).unwrap();
        plan.data_source.selected_row_index = None;
        plan.data_source.rows = vec![RowData::new()];
        assert!(selected_row(&plan).is_ok());
    }
}
