//! Declarative web-form automation engine
//!
//! Takes an [`AutomationPlan`] produced by an external builder layer and
//! executes it against a live browser via chromiumoxide: resolve form fields
//! by their labels, type values with human pacing, click through the flow,
//! and report per-row outcomes.

pub mod actions;
pub mod browser_setup;
mod dom;
pub mod error;
pub mod human_type;
pub mod indicators;
pub mod locate;
pub mod login;
pub mod navigation;
pub mod normalize;
pub mod plan;
pub mod report;
pub mod runner;
pub mod session;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::human_type::TypingPacing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    /// Optional geolocation override applied to every session.
    #[serde(default)]
    pub geolocation: Option<GeolocationConfig>,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    /// Window dimensions
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Timeouts and pacing, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    #[serde(default = "default_page_ready_timeout_ms")]
    pub page_ready_timeout_ms: u64,

    #[serde(default = "default_indicator_timeout_ms")]
    pub indicator_timeout_ms: u64,

    /// Upper bound applied to every configurable timeout.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    #[serde(default = "default_type_min_delay_ms")]
    pub type_min_delay_ms: u64,

    #[serde(default = "default_type_max_delay_ms")]
    pub type_max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_geolocation_accuracy")]
    pub accuracy: f64,
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    false // SECURE BY DEFAULT
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_page_ready_timeout_ms() -> u64 {
    30_000
}

fn default_indicator_timeout_ms() -> u64 {
    10_000
}

fn default_max_timeout_ms() -> u64 {
    300_000
}

fn default_type_min_delay_ms() -> u64 {
    50
}

fn default_type_max_delay_ms() -> u64 {
    150
}

fn default_geolocation_accuracy() -> f64 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            timing: TimingConfig::default(),
            geolocation: None,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            page_ready_timeout_ms: default_page_ready_timeout_ms(),
            indicator_timeout_ms: default_indicator_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            type_min_delay_ms: default_type_min_delay_ms(),
            type_max_delay_ms: default_type_max_delay_ms(),
        }
    }
}

impl Config {
    fn clamped(&self, ms: u64) -> Duration {
        Duration::from_millis(ms.min(self.timing.max_timeout_ms))
    }

    pub fn navigation_timeout(&self) -> Duration {
        self.clamped(self.timing.navigation_timeout_ms)
    }

    pub fn page_ready_timeout(&self) -> Duration {
        self.clamped(self.timing.page_ready_timeout_ms)
    }

    pub fn indicator_timeout(&self) -> Duration {
        self.clamped(self.timing.indicator_timeout_ms)
    }

    pub fn typing_pacing(&self) -> TypingPacing {
        TypingPacing {
            min_delay_ms: self.timing.type_min_delay_ms,
            max_delay_ms: self.timing.type_max_delay_ms,
        }
    }
}

/// Load config from config.yaml in package root
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

pub use error::{EngineError, EngineResult};
pub use normalize::normalize_plan;
pub use plan::AutomationPlan;
pub use report::{ExecutionReport, ReportStatus, RowExecutionResult, RunRecord};
pub use runner::{execute_automation_plan, execute_automation_plan_with_config};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert!(config.browser.headless);
        assert!(!config.browser.disable_security);
        assert_eq!(config.browser.window.width, 1280);
        assert_eq!(config.timing.navigation_timeout_ms, 30_000);
        assert!(config.geolocation.is_none());
    }

    #[test]
    fn timeouts_are_clamped_to_max() {
        let mut config = Config::default();
        config.timing.navigation_timeout_ms = 900_000;
        assert_eq!(config.navigation_timeout(), Duration::from_millis(300_000));
    }

    #[test]
    fn config_parses_from_yaml() {
        let yaml = "\
browser:
  headless: false
  window:
    width: 1920
    height: 1080
timing:
  indicator_timeout_ms: 5000
geolocation:
  latitude: -6.2
  longitude: 106.8
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window.width, 1920);
        assert_eq!(config.timing.indicator_timeout_ms, 5_000);
        assert_eq!(config.timing.navigation_timeout_ms, 30_000);
        let geo = config.geolocation.unwrap();
        assert_eq!(geo.accuracy, 1.0);
    }
}
