//! Global setup: log in once per browser and keep the session

use std::path::{Path, PathBuf};

use tracing::info;

use crate::env::EnvConfig;
use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::pages::{BasePage, LoginPage};
use crate::playwright::{Browser, LaunchOptions, PlaywrightConfig, PlaywrightDriver};
use crate::session::SessionSettings;

/// Log in on `page` and save its storage state to `path`
pub async fn login_and_save_state<P: Page + ?Sized>(
    page: &P,
    env: &EnvConfig,
    settings: &SessionSettings,
    path: &Path,
) -> E2eResult<()> {
    let base = BasePage::new(page, &env.base_url)
        .with_popups(&settings.popups)
        .with_expect_timeout(settings.expect_timeout);
    let login = LoginPage::new(base);

    login.goto_login().await?;
    login.login(&env.username, &env.password).await?;
    login
        .verify_successful_login()
        .await
        .map_err(|e| E2eError::StepFailed {
            step: "global setup login".to_string(),
            reason: e.to_string(),
        })?;

    page.save_storage_state(path).await
}

/// Produce a logged-in storage state for every browser
pub async fn global_setup(
    env: &EnvConfig,
    config: &PlaywrightConfig,
    settings: &SessionSettings,
    browsers: &[Browser],
) -> E2eResult<Vec<PathBuf>> {
    let mut saved = Vec::with_capacity(browsers.len());

    for &browser in browsers {
        let driver = PlaywrightDriver::launch(
            config,
            LaunchOptions {
                browser,
                ..Default::default()
            },
        )
        .await?;

        let path = settings.storage_state_path(browser);
        let result = login_and_save_state(&driver, env, settings, &path).await;
        driver.close(None).await?;
        result?;

        info!("Saved logged-in storage state for {}", browser);
        saved.push(path);
    }

    Ok(saved)
}
