//! Per-test browser sessions
//!
//! A [`Session`] bundles the page with everything a test needs from its
//! surroundings: the environment, the popup policy and where uploads and
//! storage state live. Nothing here is process-wide; parallel tests each
//! own a session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::EnvConfig;
use crate::error::E2eResult;
use crate::locator::LoadState;
use crate::page::Page;
use crate::pages::base::DEFAULT_EXPECT_TIMEOUT;
use crate::pages::{BasePage, DataTransferPage, LoginPage, PopupHandler};
use crate::playwright::{Browser, LaunchOptions, PlaywrightConfig, PlaywrightDriver};
use crate::watch::DEFAULT_POLL_INTERVAL_MS;

/// Starting point of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fixture {
    /// Empty context, storage cleared, popups dismissed on every navigation
    Fresh,
    /// Context restored from the storage state saved by global setup
    LoggedIn,
}

/// Filesystem locations and timing shared by all sessions of a run
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Where `storageState.<browser>.json` files are kept
    pub storage_dir: PathBuf,
    /// Local files offered to the upload wizard
    pub uploads_dir: PathBuf,
    pub expect_timeout: Duration,
    pub poll_interval: Duration,
    pub popups: PopupHandler,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("tests/support"),
            uploads_dir: PathBuf::from("uploads"),
            expect_timeout: DEFAULT_EXPECT_TIMEOUT,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            popups: PopupHandler::default(),
        }
    }
}

impl SessionSettings {
    pub fn storage_state_path(&self, browser: Browser) -> PathBuf {
        storage_state_path(&self.storage_dir, browser)
    }
}

/// Storage state file for `browser` under `dir`
pub fn storage_state_path(dir: &Path, browser: Browser) -> PathBuf {
    dir.join(format!("storageState.{}.json", browser))
}

pub struct Session<P: Page> {
    page: P,
    browser: Browser,
    env: EnvConfig,
    settings: SessionSettings,
    rehandle_popups: bool,
}

impl<P: Page> Session<P> {
    pub fn new(page: P, browser: Browser, env: EnvConfig, settings: SessionSettings) -> Self {
        Self {
            page,
            browser,
            env,
            settings,
            rehandle_popups: false,
        }
    }

    /// Reset the session to a logged-out state and clear popups.
    /// Later navigations through page objects dismiss popups again.
    pub async fn prepare_fresh(&mut self) -> E2eResult<()> {
        self.page
            .goto(self.env.base_url.as_str(), LoadState::DomContentLoaded)
            .await?;
        self.page.clear_session_data().await?;
        self.page.dismiss_dialogs().await?;

        let dismissed = self.settings.popups.handle(&self.page).await?;
        debug!("Fresh {} session ready ({} popups dismissed)", self.browser, dismissed);

        self.rehandle_popups = true;
        Ok(())
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn browser(&self) -> Browser {
        self.browser
    }

    pub fn env(&self) -> &EnvConfig {
        &self.env
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn base_page(&self) -> BasePage<'_, P> {
        let mut base = BasePage::new(&self.page, &self.env.base_url)
            .with_expect_timeout(self.settings.expect_timeout);
        base.poll_interval = self.settings.poll_interval;
        if self.rehandle_popups {
            base = base.with_popups(&self.settings.popups);
        }
        base
    }

    pub fn login_page(&self) -> LoginPage<'_, P> {
        LoginPage::new(self.base_page())
    }

    pub fn data_transfer_page(&self) -> DataTransferPage<'_, P> {
        DataTransferPage::new(self.base_page(), &self.settings.uploads_dir)
    }

    pub fn into_page(self) -> P {
        self.page
    }
}

impl Session<PlaywrightDriver> {
    /// Launch a browser for `fixture` and prepare it
    pub async fn open(
        fixture: Fixture,
        browser: Browser,
        env: EnvConfig,
        settings: SessionSettings,
        config: &PlaywrightConfig,
        video_dir: Option<PathBuf>,
    ) -> E2eResult<Self> {
        let storage_state = match fixture {
            Fixture::Fresh => None,
            Fixture::LoggedIn => Some(settings.storage_state_path(browser)),
        };

        let driver = PlaywrightDriver::launch(
            config,
            LaunchOptions {
                browser,
                storage_state,
                video_dir,
            },
        )
        .await?;

        let mut session = Session::new(driver, browser, env, settings);
        if fixture == Fixture::Fresh {
            session.prepare_fresh().await?;
        }
        Ok(session)
    }
}
