//! Automation plan data model
//!
//! Plans are produced by an external builder UI and arrive as JSON. Every type
//! here round-trips through serde with the camelCase field names that layer
//! uses. The plan is immutable for the duration of one execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One data record driving one pass through the action list.
pub type RowData = serde_json::Map<String, Value>;

/// A predicate over page state used for readiness/success/failure detection.
///
/// The same shape serves two contracts: a non-throwing one-shot check
/// ([`crate::indicators::check_indicator`]) and a blocking wait
/// ([`crate::indicators::wait_for_indicator`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(rename = "type")]
    pub kind: IndicatorKind,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    /// A CSS selector that must match a visible element.
    Selector,
    /// Visible text somewhere on the page.
    Text,
    /// Substring of the current URL (substring, not exact, to tolerate
    /// query-string variance).
    Url,
}

impl Indicator {
    /// An indicator is usable only when both parts are non-empty.
    pub fn is_configured(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

/// Credentials and entry point for the best-effort login precondition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// One pre-navigation step executed before the main flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStep {
    #[serde(rename = "type")]
    pub kind: NavigationStepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Sleep length for `wait` steps, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<Indicator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationStepKind {
    Click,
    Navigate,
    Wait,
}

/// Where to run and how to know the page is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_ready_indicator: Option<Indicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<LoginConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Vec<NavigationStep>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Upload,
    Manual,
}

impl Default for DataSourceKind {
    fn default() -> Self {
        DataSourceKind::Manual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataMode {
    Single,
    Batch,
}

impl Default for DataMode {
    fn default() -> Self {
        DataMode::Single
    }
}

/// The rows feeding the run and how to iterate them.
///
/// Invariant (enforced by normalization): `rows` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    #[serde(rename = "type", default)]
    pub kind: DataSourceKind,
    #[serde(default)]
    pub rows: Vec<RowData>,
    #[serde(default)]
    pub mode: DataMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_row_index: Option<usize>,
}

impl Default for DataSource {
    fn default() -> Self {
        Self {
            kind: DataSourceKind::Manual,
            rows: vec![RowData::new()],
            mode: DataMode::Single,
            selected_row_index: Some(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Select,
    Checkbox,
    Radio,
    Textarea,
}

impl Default for FieldKind {
    fn default() -> Self {
        FieldKind::Text
    }
}

/// Maps a named form field to the page element that receives its value.
///
/// `name` is the join key referenced by `Action::target` on fill actions.
/// `labels` carry the human-visible label candidates the locator resolves
/// against; `fallback_labels` are routed through the clickable resolver
/// instead, since they are often button/link anchors rather than field labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub data_key: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_labels: Option<Vec<String>>,
    /// Opaque conditional metadata owned by the plan-builder layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Fill,
    Click,
    Wait,
    HandleDialog,
    Navigate,
    /// Anything the engine does not recognize; fails at execution time,
    /// not at parse time, so one bad action cannot reject a whole plan.
    /// The raw type string is kept so the failure can name it.
    Unknown(String),
}

impl ActionKind {
    /// Wire name of the action type, as the builder layer spells it.
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Fill => "fill",
            ActionKind::Click => "click",
            ActionKind::Wait => "wait",
            ActionKind::HandleDialog => "handleDialog",
            ActionKind::Navigate => "navigate",
            ActionKind::Unknown(raw) => raw,
        }
    }
}

impl Serialize for ActionKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "fill" => ActionKind::Fill,
            "click" => ActionKind::Click,
            "wait" => ActionKind::Wait,
            "handleDialog" => ActionKind::HandleDialog,
            "navigate" => ActionKind::Navigate,
            _ => ActionKind::Unknown(raw),
        })
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the plan. Executed strictly in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// For `fill`: overrides the row value. For `wait`: sleep length in
    /// SECONDS. The seconds unit is inherited from the plan schema and is
    /// intentionally inconsistent with the millisecond timeouts elsewhere;
    /// do not "fix" it here without a schema migration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<Indicator>,
    /// Defaults to required: a failing action aborts the row unless this is
    /// explicitly `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl Action {
    pub fn is_required(&self) -> bool {
        self.required != Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Once,
    Loop,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Once
    }
}

/// Stop policy for loop mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopWhen {
    /// Stop once the indicator becomes true.
    Visible,
    /// Stop once the indicator becomes false (the default).
    NotVisible,
}

impl Default for StopWhen {
    fn default() -> Self {
        StopWhen::NotVisible
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Pacing between iterations, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<f64>,
    #[serde(default)]
    pub stop_when: StopWhen,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<Indicator>,
}

pub const DEFAULT_LOOP_MAX_ITERATIONS: u32 = 50;

impl LoopConfig {
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations.unwrap_or(DEFAULT_LOOP_MAX_ITERATIONS)
    }

    pub fn delay_seconds(&self) -> f64 {
        self.delay_seconds.unwrap_or(0.0).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: RunMode,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub loop_config: Option<LoopConfig>,
}

/// The declarative automation specification executed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationPlan {
    pub target: Target,
    #[serde(default)]
    pub data_source: DataSource,
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_indicator: Option<Indicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_indicator: Option<Indicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionConfig>,
}

impl AutomationPlan {
    /// Look up the field mapping an action's `target` refers to.
    pub fn field_mapping(&self, name: &str) -> Option<&FieldMapping> {
        self.field_mappings.iter().find(|fm| fm.name == name)
    }

    /// True when the plan contains a `handleDialog` action anywhere, which
    /// makes the dialog guard install eagerly at session start.
    pub fn wants_dialog_guard(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.kind == ActionKind::HandleDialog)
    }

    /// Configured success indicator, if both type and value are present.
    pub fn success_indicator(&self) -> Option<&Indicator> {
        self.success_indicator.as_ref().filter(|i| i.is_configured())
    }

    /// Configured failure indicator, if both type and value are present.
    pub fn failure_indicator(&self) -> Option<&Indicator> {
        self.failure_indicator.as_ref().filter(|i| i.is_configured())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_deserializes_from_builder_json() {
        let raw = serde_json::json!({
            "target": {
                "url": "https://app.example.com/form",
                "pageReadyIndicator": { "type": "selector", "value": "#form" },
                "login": {
                    "url": "https://app.example.com/login",
                    "username": "ops",
                    "password": "secret"
                }
            },
            "dataSource": {
                "type": "upload",
                "rows": [{ "amount": "120.50", "memo": "rent" }],
                "mode": "batch"
            },
            "fieldMappings": [{
                "name": "amount",
                "type": "text",
                "dataKey": "amount",
                "required": true,
                "labels": ["Amount", "Total"]
            }],
            "actions": [
                { "type": "fill", "target": "amount" },
                { "type": "click", "target": "Save", "waitFor": { "type": "text", "value": "Saved" } },
                { "type": "handleDialog" }
            ],
            "successIndicator": { "type": "text", "value": "Saved" }
        });

        let plan: AutomationPlan = serde_json::from_value(raw).unwrap();
        assert_eq!(plan.data_source.mode, DataMode::Batch);
        assert_eq!(plan.actions.len(), 3);
        assert_eq!(plan.actions[0].kind, ActionKind::Fill);
        assert!(plan.actions[0].is_required());
        assert!(plan.wants_dialog_guard());
        assert_eq!(plan.field_mapping("amount").unwrap().labels.len(), 2);
        assert!(plan.success_indicator().is_some());
        assert!(plan.failure_indicator().is_none());
    }

    // The raw type string survives parsing so the execution-time error can
    // name the offending type, and serializes back out unchanged.
    #[test]
    fn unknown_action_type_keeps_its_raw_name() {
        let action: Action =
            serde_json::from_value(serde_json::json!({ "type": "teleport" })).unwrap();
        assert_eq!(action.kind, ActionKind::Unknown("teleport".into()));
        assert_eq!(action.kind.to_string(), "teleport");

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "teleport");
    }

    #[test]
    fn optional_action_is_not_required() {
        let action: Action =
            serde_json::from_value(serde_json::json!({ "type": "click", "target": "x", "required": false }))
                .unwrap();
        assert!(!action.is_required());
    }

    #[test]
    fn blank_indicator_is_not_configured() {
        let ind = Indicator {
            kind: IndicatorKind::Text,
            value: "  ".into(),
        };
        assert!(!ind.is_configured());
    }

    #[test]
    fn loop_config_defaults() {
        let cfg: LoopConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.max_iterations(), DEFAULT_LOOP_MAX_ITERATIONS);
        assert_eq!(cfg.delay_seconds(), 0.0);
        assert_eq!(cfg.stop_when, StopWhen::NotVisible);
    }
}
