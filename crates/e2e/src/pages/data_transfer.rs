//! Data transfer screen: folder tree, upload wizard and file rows
//!
//! Uploads land in the assignment ("Opdracht") folder. Every file operation
//! first makes sure that folder is open; opening it is confirmed by polling
//! the breadcrumb, and an upload is followed through its status label with
//! [`UploadStateWatcher`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::locator::{Locator, MouseButton, WaitState};
use crate::page::Page;
use crate::pages::base::BasePage;
use crate::watch::{poll_until, UploadMarkers, UploadStateWatcher, UploadSurface, WatchRequest, WatchResult};

/// Prefix of the folder uploads go into
pub const ASSIGNMENT_FOLDER_PREFIX: &str = "opdracht";

pub struct DataTransferPage<'a, P: Page + ?Sized> {
    base: BasePage<'a, P>,
    uploads_dir: &'a Path,
    pub markers: UploadMarkers,
    pub surface: UploadSurface,
    pub add_file_button: Locator,
    pub description_field: Locator,
    pub next_button: Locator,
    pub file_input: Locator,
    pub upload_button: Locator,
    pub folder_item: Locator,
    pub breadcrumb: Locator,
}

impl<'a, P: Page + ?Sized> DataTransferPage<'a, P> {
    pub fn new(base: BasePage<'a, P>, uploads_dir: &'a Path) -> Self {
        Self {
            base,
            uploads_dir,
            markers: UploadMarkers::default(),
            surface: UploadSurface::default(),
            add_file_button: Locator::button("add file"),
            description_field: Locator::css("input[name=\"description\"]"),
            next_button: Locator::button("next"),
            file_input: Locator::css("input[type=\"file\"]"),
            upload_button: Locator::button("upload selected file"),
            folder_item: Locator::css(".folder-item, [data-folder]"),
            breadcrumb: Locator::css(".breadcrumb"),
        }
    }

    pub fn base(&self) -> &BasePage<'a, P> {
        &self.base
    }

    /// Local path of a file to upload
    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.uploads_dir.join(file_name)
    }

    pub async fn goto_data_transfer(&self) -> E2eResult<()> {
        self.base.navigate_to("/data/datatransfer").await
    }

    /// Name of the first folder whose name starts with "Opdracht"
    pub async fn assignment_folder(&self) -> E2eResult<String> {
        let names = self.base.page.all_text_contents(&self.folder_item).await?;
        let names: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();

        names
            .iter()
            .find(|name| name.to_lowercase().starts_with(ASSIGNMENT_FOLDER_PREFIX))
            .cloned()
            .ok_or_else(|| E2eError::StepFailed {
                step: "find assignment folder".to_string(),
                reason: format!("no folder starting with 'Opdracht' among {:?}", names),
            })
    }

    /// Open `folder` and wait for the breadcrumb to show it
    pub async fn open_folder(&self, folder: &str) -> E2eResult<()> {
        if self.breadcrumb_shows(folder).await {
            debug!("Folder {} already open", folder);
            return Ok(());
        }

        let item = self.folder_item.clone().has_text(folder);
        self.base.page.click(&item, MouseButton::Left).await?;

        let this = self;
        let outcome = poll_until(
            &self.base.expectation(folder),
            move || async move { this.breadcrumb_shows(folder).await },
            move || async move { this.error_banner().await },
        )
        .await;

        match outcome {
            WatchResult::Success => Ok(()),
            WatchResult::Failure(reason) => Err(E2eError::StepFailed {
                step: format!("open folder {}", folder),
                reason,
            }),
            WatchResult::Timeout => Err(E2eError::Timeout(format!("folder {} to open", folder))),
        }
    }

    /// Run the upload wizard for `file_name`. Does not wait for the upload to finish.
    pub async fn upload_file(&self, file_name: &str, description: &str, folder: &str) -> E2eResult<()> {
        let path = self.upload_path(file_name);
        if !path.exists() {
            return Err(E2eError::StepFailed {
                step: format!("upload {}", file_name),
                reason: format!("{} does not exist", path.display()),
            });
        }

        self.open_folder(folder).await?;

        let page = self.base.page;
        page.click(&self.add_file_button, MouseButton::Left).await?;
        page.fill(&self.description_field, description).await?;
        page.click(&self.next_button, MouseButton::Left).await?;
        page.set_input_files(&self.file_input, &path).await?;
        page.click(&self.upload_button, MouseButton::Left).await?;

        info!("Submitted upload of {} into {}", file_name, folder);
        Ok(())
    }

    /// Follow the status of an upload until it completes, fails or times out
    pub async fn wait_for_upload(&self, file_name: &str, timeout: Duration) -> WatchResult {
        let request = WatchRequest::new(
            file_name,
            self.base.poll_interval.as_millis() as u64,
            timeout.as_millis() as u64,
        );

        UploadStateWatcher::new(self.base.page)
            .with_markers(self.markers.clone())
            .with_surface(self.surface.clone())
            .watch(&request)
            .await
    }

    /// Wait for any error banner and return its text
    pub async fn wait_for_upload_error(&self, timeout: Duration) -> E2eResult<String> {
        let request = WatchRequest::new(
            "upload error",
            self.base.poll_interval.as_millis() as u64,
            timeout.as_millis() as u64,
        );

        let this = self;
        match poll_until(&request, || async { false }, move || async move { this.error_banner().await }).await {
            WatchResult::Failure(text) => Ok(text),
            _ => Err(E2eError::Timeout(format!(
                "upload error message within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Right-click the file to download it
    pub async fn download_file(&self, file_name: &str, folder: &str) -> E2eResult<PathBuf> {
        self.open_folder(folder).await?;

        let downloaded = self
            .base
            .page
            .download(&Locator::text(file_name), MouseButton::Right)
            .await?;

        downloaded.ok_or_else(|| {
            E2eError::AssertionFailed(format!("download of {} produced no file", file_name))
        })
    }

    /// Remove the file via its row's remove button and wait for it to disappear
    pub async fn remove_file(&self, file_name: &str, folder: &str) -> E2eResult<()> {
        self.open_folder(folder).await?;

        let page = self.base.page;
        let remove = Locator::text(file_name).parent().then(Locator::button("remove"));
        page.click(&remove, MouseButton::Left).await?;
        page.wait_for(&Locator::text(file_name), WaitState::Hidden, self.base.expect_timeout)
            .await
            .map_err(|e| E2eError::AssertionFailed(format!("{} still listed after removal: {}", file_name, e)))
    }

    /// Remove `file_name` if a previous run left it behind. Returns whether it was present.
    pub async fn ensure_file_does_not_exist(&self, file_name: &str, folder: &str) -> E2eResult<bool> {
        self.open_folder(folder).await?;

        if !self.base.page.is_visible(&Locator::text(file_name)).await? {
            return Ok(false);
        }

        info!("Removing leftover {} from {}", file_name, folder);
        self.remove_file(file_name, folder).await?;
        Ok(true)
    }

    async fn breadcrumb_shows(&self, folder: &str) -> bool {
        matches!(
            self.base.page.text_content(&self.breadcrumb).await,
            Ok(Some(text)) if text.contains(folder)
        )
    }

    async fn error_banner(&self) -> Option<String> {
        self.base
            .page
            .all_text_contents(&self.surface.error_banner)
            .await
            .ok()?
            .into_iter()
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())
    }
}
