//! Optional login precondition
//!
//! Runs before navigation and the main plan. Credential fields are found by
//! a fixed selector preference list rather than the label cascade: login
//! forms are conventional enough that name/type probes beat text matching,
//! and the fixed order keeps failures explainable.

use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::element::Element;
use tracing::{debug, info};

use crate::dom;
use crate::error::{EngineError, EngineResult};
use crate::human_type::{TypingPacing, human_type};
use crate::locate::text_matches_contains;
use crate::plan::LoginConfig;
use crate::session;

const FIELD_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(2);
const LOGIN_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const POST_SUBMIT_SETTLE: Duration = Duration::from_secs(10);

const USERNAME_SELECTORS: &[&str] = &[
    r#"input[name="username"]"#,
    r#"input[name="email"]"#,
    r#"input[type="text"]"#,
    r#"input[type="email"]"#,
    "input#username",
    "input#email",
];

const PASSWORD_SELECTORS: &[&str] = &[
    r#"input[name="password"]"#,
    r#"input[type="password"]"#,
    "input#password",
];

const SUBMIT_SELECTORS: &[&str] = &[r#"button[type="submit"]"#, r#"input[type="submit"]"#];

const SUBMIT_TEXTS: &[&str] = &["login", "log in", "sign in", "masuk"];

/// Navigate to the login page, fill the credentials with human pacing and
/// submit. The post-submit navigation wait is best-effort: many login forms
/// swap content in place without a navigation.
pub async fn perform_login(
    page: &Page,
    login: &LoginConfig,
    pacing: TypingPacing,
) -> EngineResult<()> {
    info!(url = %login.url, "performing login");
    session::goto(page, &login.url, LOGIN_NAVIGATION_TIMEOUT).await?;

    let username_field = first_visible(page, USERNAME_SELECTORS)
        .await
        .ok_or_else(|| EngineError::Login("Username field not found".into()))?;
    human_type(&username_field, &login.username, pacing).await?;

    let password_field = first_visible(page, PASSWORD_SELECTORS)
        .await
        .ok_or_else(|| EngineError::Login("Password field not found".into()))?;
    human_type(&password_field, &login.password, pacing).await?;

    let submit = find_submit(page)
        .await
        .ok_or_else(|| EngineError::Login("Submit button not found".into()))?;
    submit.click().await?;

    // Content-swap logins never navigate; a timeout here is not a failure.
    let settled = tokio::time::timeout(POST_SUBMIT_SETTLE, page.wait_for_navigation()).await;
    if settled.is_err() {
        debug!("no navigation after login submit; continuing");
    }
    info!("login submitted");
    Ok(())
}

async fn first_visible(page: &Page, selectors: &[&str]) -> Option<Element> {
    for selector in selectors {
        if let Ok(element) = page.find_element(*selector).await
            && dom::wait_visible(&element, FIELD_VISIBILITY_TIMEOUT).await
        {
            debug!(selector, "login field resolved");
            return Some(element);
        }
    }
    None
}

/// Submit resolution: conventional submit selectors first, then any button
/// whose text reads like a login verb.
async fn find_submit(page: &Page) -> Option<Element> {
    if let Some(element) = first_visible(page, SUBMIT_SELECTORS).await {
        return Some(element);
    }

    let buttons = page.find_elements("button").await.ok()?;
    for button in buttons {
        let Some(text) = dom::inner_text(&button).await else {
            continue;
        };
        if SUBMIT_TEXTS
            .iter()
            .any(|t| text_matches_contains(&text, t))
            && dom::wait_visible(&button, FIELD_VISIBILITY_TIMEOUT).await
        {
            debug!(text = %text.trim(), "login submit resolved by text");
            return Some(button);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_probes_prefer_explicit_names() {
        assert_eq!(USERNAME_SELECTORS[0], r#"input[name="username"]"#);
        assert_eq!(USERNAME_SELECTORS[1], r#"input[name="email"]"#);
        let generic = USERNAME_SELECTORS
            .iter()
            .position(|s| *s == r#"input[type="text"]"#)
            .unwrap();
        assert!(generic > 1);
    }

    #[test]
    fn submit_texts_cover_localized_variants() {
        assert!(SUBMIT_TEXTS.contains(&"masuk"));
        assert!(SUBMIT_TEXTS.contains(&"sign in"));
    }
}
