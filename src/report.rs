//! Execution results and the report returned to the caller
//!
//! Everything here is an append-only value: action results are never mutated
//! after creation, and the report is built fresh per plan execution. The
//! report's `status` is the single source of truth for the outcome; callers
//! must not infer success from the absence of errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{ActionKind, RowData};

/// Outcome of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(kind: ActionKind, target: Option<String>) -> Self {
        Self {
            kind,
            target,
            success: true,
            error: None,
        }
    }

    pub fn failed(kind: ActionKind, target: Option<String>, error: impl Into<String>) -> Self {
        Self {
            kind,
            target,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Failed,
    Partial,
}

impl RowStatus {
    /// Row status truth table, evaluated after the action list completes.
    ///
    /// - a live failure indicator always wins;
    /// - an affirmed success indicator means success;
    /// - with no indicator verdict against it, a row whose required actions
    ///   all succeeded is a success (optional-action failures surface as
    ///   warnings, not demotions);
    /// - everything else is partial.
    pub fn aggregate(
        failure_detected: bool,
        success_indicator: Option<bool>,
        required_actions_ok: bool,
    ) -> Self {
        if failure_detected {
            RowStatus::Failed
        } else if success_indicator == Some(true) {
            RowStatus::Success
        } else if required_actions_ok && success_indicator != Some(false) {
            RowStatus::Success
        } else {
            RowStatus::Partial
        }
    }
}

/// Outcome of one data row (or one loop iteration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowExecutionResult {
    pub row_index: usize,
    pub status: RowStatus,
    pub data: RowData,
    pub actions: Vec<ActionResult>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Wall-clock duration of the row, in milliseconds.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Every row fully clean.
    Success,
    /// Some rows degraded or failed, but not all.
    Partial,
    /// No row came back clean.
    Failed,
    /// The run itself could not complete (validation or session error).
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub partial: usize,
}

impl Summary {
    pub fn of(results: &[RowExecutionResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Summary::default()
        };
        for r in results {
            match r.status {
                RowStatus::Success => summary.success += 1,
                RowStatus::Failed => summary.failed += 1,
                RowStatus::Partial => summary.partial += 1,
            }
        }
        summary
    }

    /// Collapse row outcomes into the overall report status.
    pub fn report_status(&self) -> ReportStatus {
        if self.failed == 0 && self.partial == 0 {
            ReportStatus::Success
        } else if self.success > 0 || self.partial > 0 {
            ReportStatus::Partial
        } else {
            ReportStatus::Failed
        }
    }
}

/// The value returned to the caller after one plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub status: ReportStatus,
    pub summary: Summary,
    pub results: Vec<RowExecutionResult>,
    /// Wall-clock duration of the whole run, in milliseconds.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionReport {
    pub fn completed(results: Vec<RowExecutionResult>, duration: u64) -> Self {
        let summary = Summary::of(&results);
        Self {
            status: summary.report_status(),
            summary,
            results,
            duration,
            message: None,
        }
    }

    /// Report for a run that could not complete. Partial results collected
    /// before the error are preserved.
    pub fn errored(
        results: Vec<RowExecutionResult>,
        duration: u64,
        message: impl Into<String>,
    ) -> Self {
        let summary = Summary::of(&results);
        Self {
            status: ReportStatus::Error,
            summary,
            results,
            duration,
            message: Some(message.into()),
        }
    }
}

/// Boundary value for the external persisted-log sink. This core never stores
/// it; the consumer does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub target_url: String,
    pub status: ReportStatus,
    pub results: Vec<RowExecutionResult>,
}

impl RunRecord {
    pub fn from_report(
        report: &ExecutionReport,
        target_url: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            started_at,
            ended_at: started_at + chrono::Duration::milliseconds(report.duration as i64),
            target_url: target_url.to_string(),
            status: report.status,
            results: report.results.clone(),
        }
    }
}
