//! Declarative YAML test suites
//!
//! A suite names a group of scenarios and how they run together. Scenarios
//! are the portal flows this crate knows how to drive; their parameters
//! (files, expected messages, budgets) come from YAML.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::pages::login::INVALID_CREDENTIALS_MESSAGE;
use crate::session::{Fixture, Session};
use crate::watch::WatchResult;

const BUILTIN_SUITES: [(&str, &str); 2] = [
    ("login.yaml", include_str!("../suites/login.yaml")),
    ("data_transfer.yaml", include_str!("../suites/data_transfer.yaml")),
];

/// A suite parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// Unique name for this suite
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering suites
    #[serde(default)]
    pub tags: Vec<String>,

    /// Run scenarios in order and skip the rest after a failure
    #[serde(default)]
    pub serial: bool,

    #[serde(default)]
    pub skip: bool,

    /// Files removed from the assignment folder before every scenario
    #[serde(default)]
    pub cleanup_files: Vec<String>,

    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(flatten)]
    pub scenario: Scenario,
}

impl ScenarioSpec {
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.scenario.default_title())
    }
}

/// A portal flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario", rename_all = "snake_case")]
pub enum Scenario {
    /// Log in with the wrong password and expect the credentials error
    InvalidLogin {
        #[serde(default = "default_credentials_error")]
        expected_error: String,
    },

    /// Log in with valid credentials and land on the home page
    SuccessfulLogin,

    /// Upload, download and remove a file
    FileRoundTrip {
        file: String,
        description: String,
        #[serde(default = "default_upload_timeout_ms")]
        timeout_ms: u64,
    },

    /// Upload a file the portal rejects and expect the error toast
    InvalidFileType {
        file: String,
        description: String,
        #[serde(default = "default_file_type_error")]
        expected_error: String,
        #[serde(default = "default_upload_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_credentials_error() -> String {
    INVALID_CREDENTIALS_MESSAGE.to_string()
}

fn default_file_type_error() -> String {
    "illegal file type".to_string()
}

fn default_upload_timeout_ms() -> u64 {
    15_000
}

impl Scenario {
    pub fn default_title(&self) -> String {
        match self {
            Scenario::InvalidLogin { .. } => "Invalid login shows error message".to_string(),
            Scenario::SuccessfulLogin => "Successful login redirects to homepage".to_string(),
            Scenario::FileRoundTrip { file, .. } => format!("Upload, download, and remove {}", file),
            Scenario::InvalidFileType { .. } => "Upload invalid file type shows error".to_string(),
        }
    }

    /// Session the scenario starts from
    pub fn fixture(&self) -> Fixture {
        match self {
            Scenario::InvalidLogin { .. } | Scenario::SuccessfulLogin => Fixture::Fresh,
            Scenario::FileRoundTrip { .. } | Scenario::InvalidFileType { .. } => Fixture::LoggedIn,
        }
    }

    pub async fn run<P: Page>(&self, session: &Session<P>, steps: &mut StepLog) -> E2eResult<()> {
        match self {
            Scenario::InvalidLogin { expected_error } => {
                let env = session.env();
                let login = session.login_page();
                steps.step("Navigate to login page", login.goto_login()).await?;
                steps
                    .step(
                        "Attempt login with wrong password",
                        login.login(&env.username, &env.wrong_password),
                    )
                    .await?;
                steps
                    .step("Verify error message is displayed", login.verify_error_message(expected_error))
                    .await
            }

            Scenario::SuccessfulLogin => {
                let env = session.env();
                let login = session.login_page();
                steps.step("Navigate to login page", login.goto_login()).await?;
                steps
                    .step("Login with valid credentials", login.login(&env.username, &env.password))
                    .await?;
                steps.step("Verify successful login", login.verify_successful_login()).await
            }

            Scenario::FileRoundTrip { file, description, timeout_ms } => {
                let dt = session.data_transfer_page();
                dt.goto_data_transfer().await?;
                let folder = dt.assignment_folder().await?;

                steps
                    .step(format!("Upload {}", file), async {
                        dt.upload_file(file, description, &folder).await?;
                        match dt.wait_for_upload(file, Duration::from_millis(*timeout_ms)).await {
                            WatchResult::Success => Ok(()),
                            WatchResult::Failure(reason) => Err(E2eError::AssertionFailed(format!(
                                "upload of {} failed: {}",
                                file, reason
                            ))),
                            WatchResult::Timeout => Err(E2eError::Timeout(format!(
                                "{} to finish uploading within {} ms",
                                file, timeout_ms
                            ))),
                        }
                    })
                    .await?;

                steps
                    .step(format!("Download {}", file), async {
                        let path = dt.download_file(file, &folder).await?;
                        debug!("Downloaded {} to {}", file, path.display());
                        Ok(())
                    })
                    .await?;

                steps
                    .step(format!("Remove {}", file), dt.remove_file(file, &folder))
                    .await
            }

            Scenario::InvalidFileType {
                file,
                description,
                expected_error,
                timeout_ms,
            } => {
                let dt = session.data_transfer_page();
                dt.goto_data_transfer().await?;
                let folder = dt.assignment_folder().await?;

                steps
                    .step(format!("Upload {}", file), dt.upload_file(file, description, &folder))
                    .await?;

                steps
                    .step("Verify error toast message", async {
                        match dt.wait_for_upload(file, Duration::from_millis(*timeout_ms)).await {
                            WatchResult::Failure(reason)
                                if reason.to_lowercase().contains(&expected_error.to_lowercase()) =>
                            {
                                Ok(())
                            }
                            WatchResult::Failure(reason) => Err(E2eError::AssertionFailed(format!(
                                "expected error containing {:?}, got {:?}",
                                expected_error, reason
                            ))),
                            WatchResult::Success => Err(E2eError::AssertionFailed(format!(
                                "upload of {} unexpectedly succeeded",
                                file
                            ))),
                            WatchResult::Timeout => Err(E2eError::AssertionFailed(format!(
                                "no upload error for {} within {} ms",
                                file, timeout_ms
                            ))),
                        }
                    })
                    .await
            }
        }
    }
}

impl SuiteSpec {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SuiteParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        let mut suites = paths
            .iter()
            .map(|path| Self::from_file(path))
            .collect::<E2eResult<Vec<_>>>()?;
        suites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suites)
    }

    /// Suites shipped with the crate
    pub fn builtin() -> E2eResult<Vec<Self>> {
        BUILTIN_SUITES
            .iter()
            .map(|(file, yaml)| {
                Self::from_yaml(yaml).map_err(|e| E2eError::SuiteParse(format!("{}: {}", file, e)))
            })
            .collect()
    }

    /// Filter suites by tag
    pub fn filter_by_tag<'a>(suites: &'a [Self], tag: &str) -> Vec<&'a Self> {
        suites.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SuiteParse("suite name must not be empty".to_string()));
        }
        if self.scenarios.is_empty() {
            return Err(E2eError::SuiteParse(format!("suite {} has no scenarios", self.name)));
        }
        Ok(())
    }

    /// Remove leftovers of earlier runs before a scenario
    pub async fn before_each<P: Page>(&self, session: &Session<P>) -> E2eResult<()> {
        if self.cleanup_files.is_empty() {
            return Ok(());
        }

        let dt = session.data_transfer_page();
        dt.goto_data_transfer().await?;
        let folder = dt.assignment_folder().await?;

        for file in &self.cleanup_files {
            if dt.ensure_file_does_not_exist(file, &folder).await? {
                info!("Cleaned up {} before {}", file, self.name);
            }
        }
        Ok(())
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Records named steps of a scenario as they run
#[derive(Debug, Default)]
pub struct StepLog {
    steps: Vec<StepResult>,
}

impl StepLog {
    /// Run `fut` as a named step
    pub async fn step<T, F>(&mut self, name: impl Into<String>, fut: F) -> E2eResult<T>
    where
        F: Future<Output = E2eResult<T>>,
    {
        let step_name = name.into();
        let start = Instant::now();
        debug!("Executing step: {}", step_name);

        let result = fut.await;

        self.steps.push(StepResult {
            success: result.is_ok(),
            step_name,
            duration_ms: start.elapsed().as_millis() as u64,
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        result
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<StepResult> {
        self.steps
    }
}
