//! Plan validation and defaulting
//!
//! Runs before any browser session starts, so a malformed plan never costs a
//! Chrome launch.

use crate::error::{EngineError, EngineResult};
use crate::plan::{AutomationPlan, DataMode, DataSource, RowData};

/// Validate a raw plan and fill in defaults.
///
/// Rejects plans missing `target.url` or a usable `pageReadyIndicator`, and
/// plans whose `selectedRowIndex` points outside `dataSource.rows`.
/// Guarantees afterwards: `dataSource.rows` is non-empty (a missing or empty
/// source becomes one empty row) and `mode` is either `single` or `batch`.
/// Idempotent: normalizing an already-normalized plan is a no-op.
pub fn normalize_plan(mut plan: AutomationPlan) -> EngineResult<AutomationPlan> {
    if plan.target.url.trim().is_empty() {
        return Err(EngineError::Validation("target.url is missing".into()));
    }
    match &plan.target.page_ready_indicator {
        Some(indicator) if indicator.is_configured() => {}
        _ => {
            return Err(EngineError::Validation(
                "target.pageReadyIndicator is missing or incomplete".into(),
            ));
        }
    }

    plan.data_source = normalize_data_source(plan.data_source);

    // Caught here so a bad row selection never costs a browser launch.
    if let Some(index) = plan.data_source.selected_row_index
        && index >= plan.data_source.rows.len()
    {
        return Err(EngineError::Validation(format!(
            "selectedRowIndex {index} out of range ({} rows)",
            plan.data_source.rows.len()
        )));
    }

    Ok(plan)
}

fn normalize_data_source(mut source: DataSource) -> DataSource {
    if source.rows.is_empty() {
        source.rows.push(RowData::new());
    }
    if source.mode != DataMode::Batch {
        source.mode = DataMode::Single;
    }
    if source.mode == DataMode::Single && source.selected_row_index.is_none() {
        source.selected_row_index = Some(0);
    }
    source
}
