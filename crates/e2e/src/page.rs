//! The browser page capability the page objects are written against

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::E2eResult;
use crate::locator::{LoadState, Locator, MouseButton, WaitState};

/// One browser page inside its own context
///
/// Implemented by [`crate::playwright::PlaywrightDriver`] for real runs.
/// Methods take `&self` so a page can be shared by several page objects
/// for the duration of a test.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to an absolute URL
    async fn goto(&self, url: &str, wait_until: LoadState) -> E2eResult<()>;

    /// Click the first element matching `target`
    async fn click(&self, target: &Locator, button: MouseButton) -> E2eResult<()>;

    /// Replace the value of an input
    async fn fill(&self, target: &Locator, value: &str) -> E2eResult<()>;

    /// Attach a local file to a file input
    async fn set_input_files(&self, target: &Locator, path: &Path) -> E2eResult<()>;

    /// Text of the first match, `None` when nothing matches
    async fn text_content(&self, target: &Locator) -> E2eResult<Option<String>>;

    /// Text of every match, in document order
    async fn all_text_contents(&self, target: &Locator) -> E2eResult<Vec<String>>;

    async fn is_visible(&self, target: &Locator) -> E2eResult<bool>;

    /// Wait until the first match reaches `state`
    async fn wait_for(&self, target: &Locator, state: WaitState, timeout: Duration) -> E2eResult<()>;

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()>;

    /// Current page URL
    async fn url(&self) -> E2eResult<String>;

    /// Click `trigger` and wait for the download it starts.
    /// Returns the local path of the downloaded file if the browser kept one.
    async fn download(&self, trigger: &Locator, button: MouseButton) -> E2eResult<Option<PathBuf>>;

    /// Clear cookies, permissions, localStorage and sessionStorage
    async fn clear_session_data(&self) -> E2eResult<()>;

    /// Dismiss every JS dialog (alert/confirm/prompt) from now on
    async fn dismiss_dialogs(&self) -> E2eResult<()>;

    /// Persist cookies and storage so a later context can start logged in
    async fn save_storage_state(&self, path: &Path) -> E2eResult<()>;

    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    /// Close the page and its browser. `trace_path` receives the trace if tracing was on.
    async fn close(&self, trace_path: Option<&Path>) -> E2eResult<()>;
}
