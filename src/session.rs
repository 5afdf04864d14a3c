//! Browser session lifecycle
//!
//! One session = one browser process, one CDP handler task, one page. The
//! session is exclusively owned by the executing flow; the only mutable
//! session-scoped state beyond the page itself is [`SessionState`], which
//! carries the dialog-guard idempotency flag as an explicit struct instead
//! of a property bag on the driver's page handle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use chromiumoxide_cdp::cdp::browser_protocol::emulation::SetGeolocationOverrideParams;
use chromiumoxide_cdp::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Config;
use crate::browser_setup;
use crate::error::{EngineError, EngineResult};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Mutable session-scoped flags.
#[derive(Debug, Default)]
pub struct SessionState {
    dialog_guard_installed: bool,
}

/// One-shot removal of the session profile directory. Both the orderly
/// `close()` path and the `Drop` backstop funnel through `run`, so the
/// directory is removed exactly once no matter which path fires first.
#[derive(Debug, Default)]
struct SessionCleanup {
    profile_dir: Option<PathBuf>,
}

impl SessionCleanup {
    fn new(profile_dir: PathBuf) -> Self {
        Self {
            profile_dir: Some(profile_dir),
        }
    }

    /// Returns true when this call performed the removal.
    fn run(&mut self) -> bool {
        let Some(dir) = self.profile_dir.take() else {
            return false;
        };
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "failed to remove session profile dir");
        }
        true
    }
}

/// Owns the browser, its event handler task and the single page a plan
/// executes against. Releasing the browser on every exit path is a
/// correctness requirement, not hygiene: `close()` is the orderly path and
/// `Drop` is the backstop for early returns and errors.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    cleanup: SessionCleanup,
    dialog_task: Option<JoinHandle<()>>,
    state: SessionState,
}

impl BrowserSession {
    /// Launch a browser per the config and open a blank page.
    pub async fn launch(config: &Config) -> Result<Self> {
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "formpilot_{}_{seq}",
            std::process::id()
        ));

        let (browser, handler) = browser_setup::launch_browser(
            &config.browser,
            Some(user_data_dir.clone()),
        )
        .await?;

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open initial page")?;

        if let Some(geo) = &config.geolocation {
            let params = SetGeolocationOverrideParams::builder()
                .latitude(geo.latitude)
                .longitude(geo.longitude)
                .accuracy(geo.accuracy)
                .build();
            page.execute(params)
                .await
                .context("Failed to apply geolocation override")?;
            info!(
                latitude = geo.latitude,
                longitude = geo.longitude,
                "geolocation override applied"
            );
        }

        Ok(Self {
            browser,
            handler,
            page,
            cleanup: SessionCleanup::new(user_data_dir),
            dialog_task: None,
            state: SessionState::default(),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Install the auto-accept handler for native dialogs. Idempotent: a
    /// second call is a no-op. Dialogs opened by any earlier click would
    /// otherwise park the page and make the plan look stalled.
    pub async fn install_dialog_auto_accept(&mut self) -> EngineResult<()> {
        if self.state.dialog_guard_installed {
            return Ok(());
        }

        let mut dialogs = self
            .page
            .event_listener::<EventJavascriptDialogOpening>()
            .await?;
        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                debug!(message = %dialog.message, "auto-accepting native dialog");
                match HandleJavaScriptDialogParams::builder().accept(true).build() {
                    Ok(params) => {
                        if let Err(e) = page.execute(params).await {
                            warn!(error = %e, "failed to accept dialog");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to build dialog-accept params"),
                }
            }
        });

        self.dialog_task = Some(task);
        self.state.dialog_guard_installed = true;
        Ok(())
    }

    /// Orderly shutdown: stop the dialog guard, close the browser process,
    /// wait for it to exit, stop the handler, remove the temp profile.
    pub async fn close(mut self) {
        if let Some(task) = self.dialog_task.take() {
            task.abort();
        }
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "failed to close browser cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "failed to wait for browser exit");
        }
        self.handler.abort();
        self.cleanup.run();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser::drop kills the Chrome process; the tasks must not outlive it.
        self.handler.abort();
        if let Some(task) = self.dialog_task.take() {
            task.abort();
        }
        if self.cleanup.run() {
            warn!("session dropped without close(); profile dir removed best-effort");
        }
    }
}

/// Navigate and wait for the load to settle, with an overall deadline.
pub async fn goto(page: &Page, url: &str, timeout: Duration) -> EngineResult<()> {
    tokio::time::timeout(timeout, page.goto(url))
        .await
        .map_err(|_| {
            EngineError::Navigation(format!(
                "timed out after {}ms loading {url}",
                timeout.as_millis()
            ))
        })?
        .map_err(EngineError::Browser)?;
    page.wait_for_navigation()
        .await
        .map_err(EngineError::Browser)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_starts_unguarded() {
        let state = SessionState::default();
        assert!(!state.dialog_guard_installed);
    }

    #[test]
    fn profile_dirs_are_unique_per_session() {
        let a = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        let b = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        assert_ne!(a, b);
    }

    // close() followed by Drop must not remove the directory twice; the
    // second run call reports nothing left to do.
    #[test]
    fn profile_cleanup_runs_exactly_once() {
        let dir = std::env::temp_dir().join(format!(
            "formpilot_cleanup_once_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let mut cleanup = SessionCleanup::new(dir.clone());
        assert!(cleanup.run());
        assert!(!dir.exists());
        assert!(!cleanup.run());
    }

    // A session that never reaches close() still removes its profile dir.
    #[test]
    fn profile_cleanup_removes_dir_on_first_run() {
        let dir = std::env::temp_dir().join(format!(
            "formpilot_cleanup_drop_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let mut cleanup = SessionCleanup::new(dir.clone());
        cleanup.run();
        assert!(!dir.exists());
    }

    // Missing directory is tolerated; the call still counts as the one run.
    #[test]
    fn profile_cleanup_tolerates_missing_dir() {
        let dir = std::env::temp_dir().join(format!(
            "formpilot_cleanup_gone_{}",
            std::process::id()
        ));
        let mut cleanup = SessionCleanup::new(dir);
        assert!(cleanup.run());
        assert!(!cleanup.run());
    }

    // The dialog-accept command always acknowledges the dialog positively.
    #[test]
    fn dialog_accept_params_accept() {
        let params = HandleJavaScriptDialogParams::builder()
            .accept(true)
            .build()
            .unwrap();
        assert!(params.accept);
    }
}
