//! Shared navigation and URL assertions

use std::time::Duration;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::error::{E2eError, E2eResult};
use crate::locator::{LoadState, Locator, MouseButton};
use crate::page::Page;
use crate::pages::popup::PopupHandler;
use crate::watch::{poll_until, WatchRequest, WatchResult, DEFAULT_POLL_INTERVAL_MS};

/// How long page-object assertions keep retrying
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Common behaviour of every page object
pub struct BasePage<'a, P: Page + ?Sized> {
    pub page: &'a P,
    pub base_url: &'a Url,
    /// Popups to dismiss after every navigation
    pub popups: Option<&'a PopupHandler>,
    pub expect_timeout: Duration,
    pub poll_interval: Duration,
}

impl<P: Page + ?Sized> Clone for BasePage<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Page + ?Sized> Copy for BasePage<'_, P> {}

impl<'a, P: Page + ?Sized> BasePage<'a, P> {
    pub fn new(page: &'a P, base_url: &'a Url) -> Self {
        Self {
            page,
            base_url,
            popups: None,
            expect_timeout: DEFAULT_EXPECT_TIMEOUT,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_popups(mut self, popups: &'a PopupHandler) -> Self {
        self.popups = Some(popups);
        self
    }

    pub fn with_expect_timeout(mut self, timeout: Duration) -> Self {
        self.expect_timeout = timeout;
        self
    }

    /// Resolve a path (or absolute URL) against the base URL
    pub fn resolve(&self, url: &str) -> E2eResult<Url> {
        Ok(self.base_url.join(url)?)
    }

    pub async fn navigate_to(&self, url: &str) -> E2eResult<()> {
        let target = self.resolve(url)?;
        debug!("Navigating to {}", target);
        self.page.goto(target.as_str(), LoadState::Load).await?;
        self.after_navigation().await
    }

    /// Dismiss popups on the page a navigation just landed on.
    /// Call after actions that navigate, such as submitting a form.
    pub async fn after_navigation(&self) -> E2eResult<()> {
        let Some(popups) = self.popups else {
            return Ok(());
        };

        if let Err(e) = self.page.wait_for_load_state(LoadState::DomContentLoaded).await {
            debug!("Page did not reach DOMContentLoaded: {}", e);
        }
        popups.handle(self.page).await?;
        Ok(())
    }

    pub async fn click_nav_link(&self, link_text: &str) -> E2eResult<()> {
        self.page
            .click(&Locator::link(regex::escape(link_text)), MouseButton::Left)
            .await
    }

    /// Wait until the URL contains a match for `pattern` (a regex)
    pub async fn expect_url_contains(&self, pattern: &str) -> E2eResult<()> {
        let re = Regex::new(pattern)
            .map_err(|e| E2eError::AssertionFailed(format!("invalid URL pattern /{}/: {}", pattern, e)))?;
        self.expect_url_matches(&re).await
    }

    pub async fn expect_url_matches(&self, re: &Regex) -> E2eResult<()> {
        let page = self.page;
        let outcome = poll_until(
            &self.expectation(format!("url /{}/", re.as_str())),
            move || async move {
                page.url().await.map(|url| re.is_match(&url)).unwrap_or(false)
            },
            || async { None },
        )
        .await;

        match outcome {
            WatchResult::Success => Ok(()),
            _ => {
                let actual = self.page.url().await.unwrap_or_default();
                Err(E2eError::AssertionFailed(format!(
                    "expected URL to match /{}/, was {}",
                    re.as_str(),
                    actual
                )))
            }
        }
    }

    /// Wait until the first match of `target` contains `expected`
    pub async fn expect_text_contains(&self, target: &Locator, expected: &str) -> E2eResult<()> {
        let page = self.page;
        let outcome = poll_until(
            &self.expectation(target.to_string()),
            move || async move {
                matches!(page.text_content(target).await, Ok(Some(text)) if text.contains(expected))
            },
            || async { None },
        )
        .await;

        match outcome {
            WatchResult::Success => Ok(()),
            _ => {
                let actual = self.page.text_content(target).await.ok().flatten();
                Err(E2eError::AssertionFailed(format!(
                    "expected {} to contain {:?}, found {:?}",
                    target, expected, actual
                )))
            }
        }
    }

    /// Bounds for an assertion on `what`
    pub(crate) fn expectation(&self, what: impl Into<String>) -> WatchRequest {
        WatchRequest::new(
            what,
            self.poll_interval.as_millis() as u64,
            self.expect_timeout.as_millis() as u64,
        )
    }
}
