//! Login screen

use std::time::Duration;

use regex::Regex;

use crate::error::{E2eError, E2eResult};
use crate::locator::{LoadState, Locator, MouseButton, WaitState};
use crate::page::Page;
use crate::pages::base::BasePage;

/// Shown by the portal when the credentials are rejected
pub const INVALID_CREDENTIALS_MESSAGE: &str =
    "The supplied credentials do not match our records. Please verify them and try again";

const FORM_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LoginPage<'a, P: Page + ?Sized> {
    base: BasePage<'a, P>,
    pub email_input: Locator,
    pub password_input: Locator,
    pub login_button: Locator,
    pub error_message: Locator,
}

impl<'a, P: Page + ?Sized> LoginPage<'a, P> {
    pub fn new(base: BasePage<'a, P>) -> Self {
        Self {
            base,
            email_input: Locator::css("input[name=\"Email\"]"),
            password_input: Locator::css("input[name=\"Password\"]"),
            login_button: Locator::css("#submit_button"),
            error_message: Locator::css(".validation-summary-errors"),
        }
    }

    pub fn base(&self) -> &BasePage<'a, P> {
        &self.base
    }

    /// Open `/login` and wait for the form
    pub async fn goto_login(&self) -> E2eResult<()> {
        self.base.navigate_to("/login").await?;
        self.base
            .page
            .wait_for(&Locator::css("form"), WaitState::Visible, FORM_TIMEOUT)
            .await
    }

    /// Submit the form, wait for the network to go idle and clear popups
    /// on the page the submit led to
    pub async fn login(&self, email: &str, password: &str) -> E2eResult<()> {
        let page = self.base.page;
        page.fill(&self.email_input, email).await?;
        page.fill(&self.password_input, password).await?;
        page.click(&self.login_button, MouseButton::Left).await?;
        page.wait_for_load_state(LoadState::NetworkIdle).await?;
        self.base.after_navigation().await
    }

    pub async fn verify_error_message(&self, expected: &str) -> E2eResult<()> {
        self.base.expect_text_contains(&self.error_message, expected).await
    }

    /// Logged-in users land on the home page
    pub async fn verify_successful_login(&self) -> E2eResult<()> {
        let home = Regex::new("(?i)home")
            .map_err(|e| E2eError::AssertionFailed(e.to_string()))?;
        self.base.expect_url_matches(&home).await
    }
}
