//! Bounded polling of UI state
//!
//! [`poll_until`] is the single wait loop of the crate: it runs a failure
//! check and a success check once per poll cycle until one fires or the time
//! budget runs out. [`UploadStateWatcher`] uses it to follow an uploaded
//! file's status label; the page objects use it for folder navigation and
//! for assertions that have to wait for the UI to settle.
//!
//! Inspections are scheduled at fixed offsets `k * poll_interval` from the
//! start and only while the offset is within the timeout, so a watch makes
//! at most `timeout / poll_interval + 1` inspections no matter how long each
//! inspection takes. No inspection starts once the elapsed time exceeds the
//! timeout, even when slow inspections leave scheduled offsets unused.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::locator::Locator;
use crate::page::Page;

/// Cadence used by page-object assertions
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// What to watch and for how long
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRequest {
    pub item_name: String,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl WatchRequest {
    pub fn new(item_name: impl Into<String>, poll_interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            item_name: item_name.into(),
            poll_interval_ms,
            timeout_ms,
        }
    }

    /// Poll interval, never shorter than 1ms
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Upper bound on inspections a watch with these bounds performs
    pub fn max_inspections(&self) -> u64 {
        self.timeout_ms / self.poll_interval_ms.max(1) + 1
    }
}

/// Terminal outcome of a watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum WatchResult {
    Success,
    Failure(String),
    Timeout,
}

impl WatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, WatchResult::Success)
    }
}

/// Poll until `success` returns true or `failure` yields a reason.
///
/// Failure is checked first in every cycle, so a cycle in which both
/// conditions hold reports `Failure`.
pub async fn poll_until<S, SF, F, FF>(request: &WatchRequest, mut success: S, mut failure: F) -> WatchResult
where
    S: FnMut() -> SF,
    SF: Future<Output = bool>,
    F: FnMut() -> FF,
    FF: Future<Output = Option<String>>,
{
    let interval_ms = request.poll_interval_ms.max(1);
    let start = Instant::now();
    let mut inspections: u64 = 0;

    loop {
        inspections += 1;

        if let Some(reason) = failure().await {
            debug!(item = %request.item_name, inspections, "watch failed: {}", reason);
            return WatchResult::Failure(reason);
        }

        if success().await {
            debug!(item = %request.item_name, inspections, "watch succeeded");
            return WatchResult::Success;
        }

        // Slow inspections push the schedule back; the budget still holds
        let next_offset = interval_ms.saturating_mul(inspections);
        if next_offset > request.timeout_ms || start.elapsed() > request.timeout() {
            debug!(
                item = %request.item_name,
                inspections,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "watch timed out"
            );
            return WatchResult::Timeout;
        }

        sleep_until(start + Duration::from_millis(next_offset)).await;
    }
}

/// Texts that end an upload watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMarkers {
    /// Status label values meaning the upload finished, compared trimmed and case-insensitively
    pub success: Vec<String>,

    /// Case-insensitive fragments that mark an error banner as an upload failure
    pub failure: Vec<String>,
}

impl Default for UploadMarkers {
    fn default() -> Self {
        Self {
            success: vec!["Uploaded".to_string()],
            failure: vec!["illegal file type".to_string()],
        }
    }
}

impl UploadMarkers {
    pub fn is_success(&self, status: &str) -> bool {
        let status = status.trim();
        self.success.iter().any(|m| m.eq_ignore_ascii_case(status))
    }

    pub fn is_failure(&self, banner: &str) -> bool {
        let banner = banner.to_lowercase();
        self.failure.iter().any(|m| banner.contains(&m.to_lowercase()))
    }
}

/// Selectors of the surfaces an upload watch reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSurface {
    /// Rows of the file listing
    pub row: Locator,

    /// Status cell within a row
    pub status: Locator,

    /// Toasts and banners that carry upload errors
    pub error_banner: Locator,
}

impl Default for UploadSurface {
    fn default() -> Self {
        Self {
            row: Locator::css("tr, .file-row"),
            status: Locator::css(".file-status, [data-status]"),
            error_banner: Locator::css(".toast-error, .toast.error, .alert-danger, [role=\"alert\"]"),
        }
    }
}

impl UploadSurface {
    /// Status indicator of the row holding `item_name`
    pub fn status_of(&self, item_name: &str) -> Locator {
        self.row.clone().has_text(item_name).then(self.status.clone())
    }
}

/// Follows a named item's upload status on a page
pub struct UploadStateWatcher<'a, P: Page + ?Sized> {
    page: &'a P,
    markers: UploadMarkers,
    surface: UploadSurface,
}

impl<'a, P: Page + ?Sized> UploadStateWatcher<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self {
            page,
            markers: UploadMarkers::default(),
            surface: UploadSurface::default(),
        }
    }

    pub fn with_markers(mut self, markers: UploadMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_surface(mut self, surface: UploadSurface) -> Self {
        self.surface = surface;
        self
    }

    /// Watch `request.item_name` until it is uploaded, an upload error shows or time runs out
    pub async fn watch(&self, request: &WatchRequest) -> WatchResult {
        let status = self.surface.status_of(&request.item_name);
        let status = &status;
        let this = self;

        poll_until(
            request,
            move || async move { this.status_is_success(status).await },
            move || async move { this.failure_reason().await },
        )
        .await
    }

    async fn status_is_success(&self, status: &Locator) -> bool {
        match self.page.text_content(status).await {
            Ok(Some(text)) => self.markers.is_success(&text),
            Ok(None) => false,
            Err(e) => {
                debug!("status not readable yet: {}", e);
                false
            }
        }
    }

    /// Text of the first error banner that carries a failure marker
    async fn failure_reason(&self) -> Option<String> {
        match self.page.all_text_contents(&self.surface.error_banner).await {
            Ok(banners) => banners
                .into_iter()
                .map(|text| text.trim().to_string())
                .find(|text| self.markers.is_failure(text)),
            Err(e) => {
                debug!("error banner not readable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_cycles() {
        let request = WatchRequest::new("File1.txt", 500, 5000);
        let checks = Cell::new(0u64);

        let result = poll_until(
            &request,
            || {
                checks.set(checks.get() + 1);
                let done = checks.get() > 2;
                async move { done }
            },
            || async { None },
        )
        .await;

        assert_eq!(result, WatchResult::Success);
        assert_eq!(checks.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_wins_same_cycle() {
        let request = WatchRequest::new("File3", 100, 1000);
        let result = poll_until(
            &request,
            || async { true },
            || async { Some("Illegal file type".to_string()) },
        )
        .await;
        assert_eq!(result, WatchResult::Failure("Illegal file type".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_respects_inspection_bound() {
        let request = WatchRequest::new("Big.zip", 500, 5000);
        let checks = Cell::new(0u64);
        let start = Instant::now();

        let result = poll_until(
            &request,
            || {
                checks.set(checks.get() + 1);
                async { false }
            },
            || async { None },
        )
        .await;

        assert_eq!(result, WatchResult::Timeout);
        assert_eq!(checks.get(), request.max_inspections());
        assert_eq!(checks.get(), 11);
        assert_eq!(start.elapsed(), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_inspections_stop_at_the_budget() {
        let request = WatchRequest::new("Big.zip", 500, 5000);
        let checks = Cell::new(0u64);
        let start = Instant::now();

        let result = poll_until(
            &request,
            || {
                checks.set(checks.get() + 1);
                let done = checks.get() >= 9;
                async move {
                    tokio::time::sleep(Duration::from_millis(1000)).await;
                    done
                }
            },
            || async { None },
        )
        .await;

        assert_eq!(result, WatchResult::Timeout);
        // starts at 0, 1000, ..., 5000; nothing starts past the budget
        assert_eq!(checks.get(), 6);
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_failure_check_cannot_report_late() {
        let request = WatchRequest::new("File3", 100, 1000);
        let checks = Cell::new(0u64);

        let result = poll_until(
            &request,
            || async { false },
            || {
                checks.set(checks.get() + 1);
                let banner = (checks.get() >= 3).then(|| "Illegal file type".to_string());
                async move {
                    tokio::time::sleep(Duration::from_millis(700)).await;
                    banner
                }
            },
        )
        .await;

        assert_eq!(result, WatchResult::Timeout);
        assert_eq!(checks.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uneven_budget_never_overshoots() {
        let request = WatchRequest::new("odd", 300, 1000);
        let checks = Cell::new(0u64);

        let result = poll_until(
            &request,
            || {
                checks.set(checks.get() + 1);
                async { false }
            },
            || async { None },
        )
        .await;

        assert_eq!(result, WatchResult::Timeout);
        // offsets 0, 300, 600, 900
        assert_eq!(checks.get(), 4);
        assert!(checks.get() <= request.max_inspections());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_inspects_once() {
        let request = WatchRequest::new("now", 0, 0);
        let checks = Cell::new(0u64);
        let result = poll_until(
            &request,
            || {
                checks.set(checks.get() + 1);
                async { false }
            },
            || async { None },
        )
        .await;
        assert_eq!(result, WatchResult::Timeout);
        assert_eq!(checks.get(), 1);
    }

    #[test]
    fn test_markers() {
        let markers = UploadMarkers::default();
        assert!(markers.is_success("  uploaded "));
        assert!(!markers.is_success("Uploading"));
        assert!(markers.is_failure("Error: Illegal File Type (.exe)"));
        assert!(!markers.is_failure("Upload complete"));
    }

    #[test]
    fn test_watch_result_json() {
        let failure = serde_json::to_value(WatchResult::Failure("Illegal file type".into())).unwrap();
        assert_eq!(failure["outcome"], "failure");
        assert_eq!(failure["reason"], "Illegal file type");
        let timeout = serde_json::to_value(WatchResult::Timeout).unwrap();
        assert_eq!(timeout["outcome"], "timeout");
    }
}
