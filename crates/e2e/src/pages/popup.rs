//! Cookie banners, consent dialogs and JS dialogs

use std::time::Duration;

use tracing::{debug, info};

use crate::error::E2eResult;
use crate::locator::{Locator, MouseButton, WaitState};
use crate::page::Page;

/// Dismisses whatever popups are in the way
#[derive(Debug, Clone)]
pub struct PopupHandler {
    pub selectors: Vec<Locator>,
    /// How long to wait for a clicked popup to go away
    pub detach_timeout: Duration,
    /// Pause after each dismissal so overlays can animate out
    pub settle: Duration,
}

impl Default for PopupHandler {
    fn default() -> Self {
        let selectors = [
            "button:has-text(\"Accept\")",
            "button:has-text(\"Agree\")",
            "button:has-text(\"OK\")",
            "button:has-text(\"Got it\")",
            "button:has-text(\"Close\")",
            "button:has-text(\"Continue\")",
            "[data-testid=\"cookie-accept\"]",
            "#onetrust-accept-btn-handler",
        ]
        .into_iter()
        .map(Locator::css)
        .collect();

        Self {
            selectors,
            detach_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(300),
        }
    }
}

impl PopupHandler {
    /// Click away every visible popup, then make sure JS dialogs get dismissed.
    /// Returns how many popups were dismissed.
    pub async fn handle<P: Page + ?Sized>(&self, page: &P) -> E2eResult<usize> {
        let mut dismissed = 0;

        for selector in &self.selectors {
            if !page.is_visible(selector).await.unwrap_or(false) {
                continue;
            }

            info!("Dismissing popup: {}", selector);
            page.click(selector, MouseButton::Left).await?;
            if let Err(e) = page.wait_for(selector, WaitState::Detached, self.detach_timeout).await {
                debug!("Popup {} still attached: {}", selector, e);
            }
            tokio::time::sleep(self.settle).await;
            dismissed += 1;
        }

        page.dismiss_dialogs().await?;
        Ok(dismissed)
    }
}
