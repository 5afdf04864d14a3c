use thiserror::Error;

/// Errors produced by the plan execution engine.
///
/// Propagation policy: strategy-level failures inside the locator cascades are
/// swallowed and traced; action-level failures are captured in the action
/// result unless the action is required; row-level failures always become a
/// row result. Only plan validation and unrecoverable session errors reach the
/// top-level caller, where they are folded into a report with `error` status.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid plan: {0}")]
    Validation(String),

    #[error("{what} not satisfied within {timeout_ms}ms")]
    IndicatorTimeout { what: String, timeout_ms: u64 },

    #[error("{0}")]
    Resolution(String),

    #[error("unknown action type: {0}")]
    ActionType(String),

    #[error("{0}")]
    Login(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser session error: {0}")]
    Session(String),

    #[error(transparent)]
    Browser(#[from] chromiumoxide::error::CdpError),
}

pub type EngineResult<T> = Result<T, EngineError>;
