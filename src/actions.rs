//! Action execution and row orchestration
//!
//! One row = the full action list executed in order against the live page.
//! Individual action failures become `ActionResult` entries rather than
//! errors; only a failing REQUIRED action aborts the rest of the row, and
//! even then the results collected so far are preserved.

use std::time::{Duration, Instant};

use chromiumoxide::Page;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::Config;
use crate::error::{EngineError, EngineResult};
use crate::human_type::human_type;
use crate::indicators;
use crate::locate::{click_by_text_or_selector, find_element_by_label};
use crate::plan::{
    Action, ActionKind, AutomationPlan, FieldKind, FieldMapping, LoopConfig, RowData, StopWhen,
};
use crate::report::{ActionResult, RowExecutionResult, RowStatus};
use crate::session::{self, BrowserSession};

/// Execute a single action. Failures come back as a failed [`ActionResult`];
/// the caller decides whether that aborts the row.
pub async fn execute_action(
    session: &mut BrowserSession,
    action: &Action,
    plan: &AutomationPlan,
    row: &RowData,
    config: &Config,
) -> ActionResult {
    debug!(kind = %action.kind, target = ?action.target, "executing action");
    match run_action(session, action, plan, row, config).await {
        Ok(()) => ActionResult::ok(action.kind.clone(), action.target.clone()),
        Err(e) => ActionResult::failed(action.kind.clone(), action.target.clone(), e.to_string()),
    }
}

async fn run_action(
    session: &mut BrowserSession,
    action: &Action,
    plan: &AutomationPlan,
    row: &RowData,
    config: &Config,
) -> EngineResult<()> {
    let page = session.page().clone();
    match &action.kind {
        ActionKind::Fill => fill_field(&page, action, plan, row, config).await,
        ActionKind::Click => {
            let target = action.target.as_deref().unwrap_or_default();
            click_by_text_or_selector(&page, target).await
        }
        ActionKind::Wait => {
            let seconds = wait_seconds(action);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            Ok(())
        }
        ActionKind::HandleDialog => session.install_dialog_auto_accept().await,
        ActionKind::Navigate => {
            let url = action
                .target
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(plan.target.url.as_str());
            session::goto(&page, url, config.navigation_timeout()).await?;
            if let Some(ready) = &plan.target.page_ready_indicator
                && ready.is_configured()
            {
                indicators::wait_for_page_ready(&page, ready, config.page_ready_timeout()).await?;
            }
            Ok(())
        }
        ActionKind::Unknown(raw) => Err(EngineError::ActionType(raw.clone())),
    }
}

async fn fill_field(
    page: &Page,
    action: &Action,
    plan: &AutomationPlan,
    row: &RowData,
    config: &Config,
) -> EngineResult<()> {
    let mapping = mapping_for(plan, action.target.as_deref().unwrap_or_default())?;

    let value = resolve_fill_value(action, mapping, row);
    let fallback = mapping.fallback_labels.as_deref().unwrap_or(&[]);
    let element = find_element_by_label(page, &mapping.labels, fallback, mapping.kind)
        .await
        .ok_or_else(|| {
            EngineError::Resolution(format!(
                "field not found: {} (labels: {})",
                mapping.name,
                mapping.labels.join(", ")
            ))
        })?;

    match mapping.kind {
        FieldKind::Checkbox => {
            let want = value_is_truthy(&value);
            let js = format!(
                "function() {{ if (this.checked !== {want}) this.click(); return true; }}"
            );
            element.call_js_fn(&js, false).await?;
        }
        FieldKind::Radio => {
            if value_is_truthy(&value) {
                element
                    .call_js_fn(
                        "function() { if (!this.checked) this.click(); return true; }",
                        false,
                    )
                    .await?;
            }
        }
        FieldKind::Select => select_option(&element, &mapping.name, &value).await?,
        FieldKind::Text | FieldKind::Textarea => {
            human_type(&element, &value, config.typing_pacing()).await?;
        }
    }
    Ok(())
}

/// Match an option by exact value first, then by display text
/// (case-insensitive), and fire the events a framework listens for.
async fn select_option(
    element: &chromiumoxide::element::Element,
    field: &str,
    value: &str,
) -> EngineResult<()> {
    let Ok(wanted) = serde_json::to_string(value) else {
        return Err(EngineError::Resolution(format!(
            "unencodable select value for field: {field}"
        )));
    };
    let js = format!(
        "function() {{ \
            const want = {wanted}; \
            const options = Array.from(this.options); \
            const hit = options.find(o => o.value === want) \
                || options.find(o => o.textContent.trim().toLowerCase() === want.toLowerCase()); \
            if (!hit) return false; \
            this.value = hit.value; \
            this.dispatchEvent(new Event('input', {{ bubbles: true }})); \
            this.dispatchEvent(new Event('change', {{ bubbles: true }})); \
            return true; \
        }}"
    );
    let selected = crate::dom::eval_bool(element, &js).await.unwrap_or(false);
    if selected {
        Ok(())
    } else {
        Err(EngineError::Resolution(format!(
            "no option matching \"{value}\" in select field: {field}"
        )))
    }
}

fn mapping_for<'a>(plan: &'a AutomationPlan, name: &str) -> EngineResult<&'a FieldMapping> {
    plan.field_mapping(name)
        .ok_or_else(|| EngineError::Resolution(format!("no field mapping named: {name}")))
}

/// Value precedence for fill actions: an explicit action value overrides the
/// row, the row value comes next, and a missing key fills the empty string.
fn resolve_fill_value(action: &Action, mapping: &FieldMapping, row: &RowData) -> String {
    if let Some(v) = &action.value {
        return value_to_string(v);
    }
    row.get(&mapping.data_key)
        .map(value_to_string)
        .unwrap_or_default()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Checkbox/radio semantics over loosely-typed row data.
fn value_is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "false" | "0" | "no" | "off"
    )
}

fn wait_seconds(action: &Action) -> f64 {
    let seconds = match &action.value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    seconds.unwrap_or(1.0).max(0.0)
}

/// Whether the page wandered off the planned path and needs re-navigation
/// before the row starts. Query strings and fragments are allowed to drift;
/// any path mismatch, including a cross-host bounce through a redirect or
/// SSO flow, sends the row back to the target.
fn needs_return_to_target(current: &str, planned: &str) -> bool {
    let (Ok(current), Ok(planned)) = (url::Url::parse(current), url::Url::parse(planned)) else {
        return false;
    };
    current.path() != planned.path()
}

/// Run the full action list for one data row.
pub async fn execute_actions_for_row(
    session: &mut BrowserSession,
    plan: &AutomationPlan,
    row: &RowData,
    row_index: usize,
    config: &Config,
) -> RowExecutionResult {
    let started = Instant::now();
    let mut actions: Vec<ActionResult> = Vec::with_capacity(plan.actions.len());
    let mut warnings: Vec<String> = Vec::new();
    let mut row_error: Option<String> = None;

    info!(row = row_index, "executing row");

    // A previous row's final click may have navigated away from the form.
    if let Err(e) = return_to_target_if_needed(session, plan, config, &mut warnings).await {
        let duration = started.elapsed().as_millis() as u64;
        return RowExecutionResult {
            row_index,
            status: RowStatus::Failed,
            data: row.clone(),
            actions,
            warnings,
            duration,
            error: Some(format!("could not return to target page: {e}")),
        };
    }

    let page = session.page().clone();
    for action in &plan.actions {
        let mut result = execute_action(session, action, plan, row, config).await;

        // The post-action wait runs whether or not the action itself
        // succeeded, and a timeout is a row-level checkpoint failure rather
        // than part of the action's own required/optional contract.
        let mut wait_failed = false;
        if let Some(indicator) = &action.wait_for
            && indicator.is_configured()
            && let Err(e) =
                indicators::wait_for_indicator(&page, indicator, config.indicator_timeout()).await
        {
            wait_failed = true;
            if result.success {
                result =
                    ActionResult::failed(action.kind.clone(), action.target.clone(), e.to_string());
            }
        }

        let failed = !result.success;
        actions.push(result);

        if aborts_row(action, failed, wait_failed) {
            let message = format!(
                "action failed: {} -> {}",
                action.kind,
                action.target.as_deref().unwrap_or("none")
            );
            warn!(row = row_index, %message, "aborting row");
            row_error = Some(message);
            break;
        }
        if failed {
            warnings.push(format!(
                "optional action failed: {} -> {}",
                action.kind,
                action.target.as_deref().unwrap_or("none")
            ));
        }
    }

    let failure_detected = check_failure(&page, plan).await;
    let success_indicator = match plan.success_indicator() {
        Some(indicator) => Some(indicators::check_indicator(&page, indicator).await),
        None => None,
    };
    // Optional-action failures are already recorded as warnings; only a
    // required failure counts against the row.
    let required_actions_ok = row_error.is_none();

    RowExecutionResult {
        row_index,
        status: RowStatus::aggregate(failure_detected, success_indicator, required_actions_ok),
        data: row.clone(),
        actions,
        warnings,
        duration: started.elapsed().as_millis() as u64,
        error: row_error,
    }
}

/// Whether the row stops here. A required action's failure aborts; so does
/// any failed post-action wait, even on an otherwise optional action.
fn aborts_row(action: &Action, action_failed: bool, wait_failed: bool) -> bool {
    wait_failed || (action_failed && action.is_required())
}

async fn check_failure(page: &Page, plan: &AutomationPlan) -> bool {
    match plan.failure_indicator() {
        Some(indicator) => indicators::check_indicator(page, indicator).await,
        None => false,
    }
}

async fn return_to_target_if_needed(
    session: &mut BrowserSession,
    plan: &AutomationPlan,
    config: &Config,
    warnings: &mut Vec<String>,
) -> EngineResult<()> {
    let page = session.page().clone();
    let current = match page.url().await {
        Ok(Some(url)) => url,
        _ => return Ok(()),
    };
    if !needs_return_to_target(&current, &plan.target.url) {
        return Ok(());
    }

    info!(from = %current, to = %plan.target.url, "returning to target page");
    session::goto(&page, &plan.target.url, config.navigation_timeout()).await?;
    if let Some(ready) = &plan.target.page_ready_indicator
        && ready.is_configured()
        && let Err(e) = indicators::wait_for_page_ready(&page, ready, config.page_ready_timeout()).await
    {
        warnings.push(format!("page-ready wait after re-navigation: {e}"));
    }
    Ok(())
}

/// Loop mode: the same row executed repeatedly until the stop indicator says
/// the work is done, with a hard iteration cap as the safety net.
pub async fn execute_actions_with_loop(
    session: &mut BrowserSession,
    plan: &AutomationPlan,
    row: &RowData,
    loop_config: &LoopConfig,
    config: &Config,
) -> EngineResult<Vec<RowExecutionResult>> {
    let indicator = loop_config
        .indicator
        .as_ref()
        .filter(|i| i.is_configured())
        .ok_or_else(|| {
            EngineError::Validation("loop mode requires a configured stop indicator".into())
        })?;

    let max_iterations = loop_config.max_iterations();
    let mut results = Vec::new();
    let page = session.page().clone();

    for iteration in 0..max_iterations {
        let visible = indicators::check_indicator(&page, indicator).await;
        if should_stop(loop_config.stop_when, visible) {
            info!(iteration, "loop stop condition met");
            if iteration == 0 {
                // Nothing to do is a successful outcome, not an empty report.
                results.push(idle_loop_result(row));
            }
            break;
        }

        let result =
            execute_actions_for_row(session, plan, row, iteration as usize, config).await;
        let failed = result.status == RowStatus::Failed;
        results.push(result);

        if failed
            && let Some(f) = plan.failure_indicator()
            && indicators::check_indicator(&page, f).await
        {
            warn!(iteration, "failure indicator visible; stopping loop");
            break;
        }

        let delay = loop_config.delay_seconds();
        if delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
    }

    Ok(results)
}

fn should_stop(stop_when: StopWhen, indicator_visible: bool) -> bool {
    match stop_when {
        StopWhen::Visible => indicator_visible,
        StopWhen::NotVisible => !indicator_visible,
    }
}

/// The result reported when the loop's stop condition already holds before
/// the first iteration runs.
fn idle_loop_result(row: &RowData) -> RowExecutionResult {
    RowExecutionResult {
        row_index: 0,
        status: RowStatus::Success,
        data: row.clone(),
        actions: vec![],
        warnings: vec!["stop condition already satisfied before first iteration".into()],
        duration: 0,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Action;

    fn fill_action(target: &str, value: Option<Value>) -> Action {
        serde_json::from_value(serde_json::json!({
            "type": "fill",
            "target": target,
            "value": value,
        }))
        .unwrap()
    }

    fn mapping(name: &str, data_key: &str) -> FieldMapping {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "dataKey": data_key,
            "labels": ["Label"],
        }))
        .unwrap()
    }

    #[test]
    fn fill_value_prefers_action_override() {
        let action = fill_action("amount", Some(Value::String("999".into())));
        let mut row = RowData::new();
        row.insert("amount".into(), Value::String("120".into()));
        assert_eq!(
            resolve_fill_value(&action, &mapping("amount", "amount"), &row),
            "999"
        );
    }

    #[test]
    fn fill_value_falls_back_to_row_then_empty() {
        let action = fill_action("amount", None);
        let mut row = RowData::new();
        row.insert("amount".into(), Value::from(120.5));
        assert_eq!(
            resolve_fill_value(&action, &mapping("amount", "amount"), &row),
            "120.5"
        );
        assert_eq!(
            resolve_fill_value(&action, &mapping("memo", "memo"), &row),
            ""
        );
    }

    #[test]
    fn truthiness_over_loose_row_values() {
        for v in ["true", "1", "yes", "on", "checked", "Y"] {
            assert!(value_is_truthy(v), "{v} should be truthy");
        }
        for v in ["", "false", "0", "no", "off", "  FALSE  "] {
            assert!(!value_is_truthy(v), "{v} should be falsy");
        }
    }

    #[test]
    fn wait_defaults_to_one_second() {
        let action: Action = serde_json::from_value(serde_json::json!({ "type": "wait" })).unwrap();
        assert_eq!(wait_seconds(&action), 1.0);

        let action = serde_json::from_value::<Action>(
            serde_json::json!({ "type": "wait", "value": 2.5 }),
        )
        .unwrap();
        assert_eq!(wait_seconds(&action), 2.5);

        let action = serde_json::from_value::<Action>(
            serde_json::json!({ "type": "wait", "value": "3" }),
        )
        .unwrap();
        assert_eq!(wait_seconds(&action), 3.0);

        let action = serde_json::from_value::<Action>(
            serde_json::json!({ "type": "wait", "value": -2 }),
        )
        .unwrap();
        assert_eq!(wait_seconds(&action), 0.0);
    }

    #[test]
    fn unknown_mapping_error_names_the_field() {
        let plan: AutomationPlan = serde_json::from_value(serde_json::json!({
            "target": {
                "url": "https://app.example.com/form",
                "pageReadyIndicator": { "type": "selector", "value": "#form" }
            },
            "fieldMappings": [{ "name": "amount", "dataKey": "amount", "labels": ["Amount"] }]
        }))
        .unwrap();
        assert!(mapping_for(&plan, "amount").is_ok());
        let err = mapping_for(&plan, "memo").unwrap_err();
        assert!(err.to_string().contains("no field mapping named: memo"));
    }

    #[test]
    fn stop_condition_tracks_indicator_polarity() {
        assert!(should_stop(StopWhen::Visible, true));
        assert!(!should_stop(StopWhen::Visible, false));
        assert!(should_stop(StopWhen::NotVisible, false));
        assert!(!should_stop(StopWhen::NotVisible, true));
    }

    // A loop whose stop condition holds up front reports one successful
    // zero-duration row with a warning, not an empty result set.
    #[test]
    fn idle_loop_reports_synthetic_success() {
        let mut row = RowData::new();
        row.insert("id".into(), Value::String("7".into()));
        let result = idle_loop_result(&row);
        assert_eq!(result.status, RowStatus::Success);
        assert_eq!(result.duration, 0);
        assert!(result.actions.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.data, row);
    }

    // An unrecognized action must fail with the type string the plan used,
    // not a placeholder.
    #[test]
    fn unknown_action_error_names_the_raw_type() {
        let action: Action =
            serde_json::from_value(serde_json::json!({ "type": "teleport", "target": "x" }))
                .unwrap();
        let ActionKind::Unknown(raw) = &action.kind else {
            panic!("teleport should parse as an unknown action");
        };
        let err = EngineError::ActionType(raw.clone());
        assert_eq!(err.to_string(), "unknown action type: teleport");
    }

    // The post-action indicator wait is a row checkpoint: its failure stops
    // the row even when the action itself was marked optional.
    #[test]
    fn failed_checkpoint_wait_aborts_row_even_for_optional_actions() {
        let optional: Action = serde_json::from_value(serde_json::json!({
            "type": "click",
            "target": "Save",
            "required": false,
        }))
        .unwrap();
        let required: Action = serde_json::from_value(serde_json::json!({
            "type": "click",
            "target": "Save",
        }))
        .unwrap();

        assert!(aborts_row(&optional, true, true));
        assert!(aborts_row(&optional, false, true));
        assert!(!aborts_row(&optional, true, false));
        assert!(aborts_row(&required, true, false));
        assert!(!aborts_row(&required, false, false));
    }

    #[test]
    fn return_to_target_ignores_query_drift() {
        assert!(!needs_return_to_target(
            "https://app.example.com/form?step=2",
            "https://app.example.com/form"
        ));
        assert!(needs_return_to_target(
            "https://app.example.com/dashboard",
            "https://app.example.com/form"
        ));
        assert!(!needs_return_to_target("about:blank", "not a url"));
    }

    // An SSO bounce or redirect can strand the page on another host; the row
    // must come back to the planned page all the same.
    #[test]
    fn return_to_target_recovers_from_cross_host_redirect() {
        assert!(needs_return_to_target(
            "https://sso.example.com/login?next=form",
            "https://app.example.com/form"
        ));
    }
}
