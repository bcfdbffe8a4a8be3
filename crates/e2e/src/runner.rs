//! Main test runner that orchestrates setup, browser sessions and suites

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::env::EnvConfig;
use crate::error::{E2eError, E2eResult};
use crate::page::Page;
use crate::playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
use crate::session::{Fixture, Session, SessionSettings};
use crate::suite::{ScenarioSpec, StepLog, StepResult, SuiteSpec};
use crate::target;

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub suite: String,
    pub browser: Browser,
    pub success: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub artifacts: Vec<PathBuf>,
    pub error: Option<String>,
}

impl TestResult {
    fn skipped(suite: &SuiteSpec, scenario: &ScenarioSpec, browser: Browser) -> Self {
        Self {
            name: test_name(browser, suite, scenario),
            suite: suite.name.clone(),
            browser,
            success: false,
            skipped: true,
            duration_ms: 0,
            steps: vec![],
            artifacts: vec![],
            error: None,
        }
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(started_at: DateTime<Utc>, duration_ms: u64, results: Vec<TestResult>) -> Self {
        let skipped = results.iter().filter(|r| r.skipped).count();
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            started_at,
            total: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            duration_ms,
            results,
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub env: EnvConfig,
    pub playwright: PlaywrightConfig,
    pub session: SessionSettings,
    /// Projects: every suite runs once per browser
    pub browsers: Vec<Browser>,
    /// Suite directory; built-in suites are used when `None`
    pub suites_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub fully_parallel: bool,
    pub workers: usize,
    pub test_timeout: Duration,
    pub target_timeout: Duration,
    /// Reuse storage state from an earlier global setup
    pub skip_setup: bool,
}

impl RunnerConfig {
    pub fn new(env: EnvConfig) -> Self {
        Self {
            env,
            playwright: PlaywrightConfig::default(),
            session: SessionSettings::default(),
            browsers: vec![Browser::Chromium, Browser::Firefox],
            suites_dir: None,
            output_dir: PathBuf::from("test-results"),
            fully_parallel: true,
            workers: 2,
            test_timeout: Duration::from_secs(60),
            target_timeout: Duration::from_secs(30),
            skip_setup: false,
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Suites from the configured directory, or the built-in ones
    pub fn load_suites(&self) -> E2eResult<Vec<SuiteSpec>> {
        match &self.config.suites_dir {
            Some(dir) => SuiteSpec::load_all(dir),
            None => SuiteSpec::builtin(),
        }
    }

    /// Run all suites
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let suites = self.load_suites()?;
        self.run_suites(&suites).await
    }

    /// Run suites matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let suites = self.load_suites()?;
        let filtered: Vec<SuiteSpec> = SuiteSpec::filter_by_tag(&suites, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_suites(&filtered).await
    }

    /// Run a specific suite by name
    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let suites = self.load_suites()?;
        let suite = suites
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SuiteParse(format!("Suite not found: {}", name)))?;
        self.run_suites(std::slice::from_ref(&suite)).await
    }

    /// Prepare the run once: target up, Playwright present, storage states saved
    pub async fn prepare(&self) -> E2eResult<()> {
        target::wait_for_reachable(&self.config.env.base_url, self.config.target_timeout).await?;
        PlaywrightDriver::check_installed()?;

        if self.config.skip_setup {
            info!("Skipping global setup, reusing saved storage state");
            return Ok(());
        }

        crate::setup::global_setup(
            &self.config.env,
            &self.config.playwright,
            &self.config.session,
            &self.config.browsers,
        )
        .await?;
        Ok(())
    }

    /// Run a list of suites for every configured browser
    pub async fn run_suites(&self, suites: &[SuiteSpec]) -> E2eResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        self.prepare().await?;

        let units: Vec<(Browser, &SuiteSpec)> = self
            .config
            .browsers
            .iter()
            .flat_map(|&browser| suites.iter().map(move |suite| (browser, suite)))
            .collect();

        let workers = if self.config.fully_parallel {
            self.config.workers.max(1)
        } else {
            1
        };

        info!(
            "Running {} suite(s) on {} browser(s) with {} worker(s)...",
            suites.len(),
            self.config.browsers.len(),
            workers
        );

        let results: Vec<TestResult> = stream::iter(units)
            .map(move |(browser, suite)| {
                run_suite_with(suite, browser, move |scenario| self.run_test(suite, scenario, browser))
            })
            .buffer_unordered(workers)
            .collect::<Vec<Vec<TestResult>>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        let summary = TestSuiteResult::from_results(started_at, start.elapsed().as_millis() as u64, results);

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            summary.passed, summary.failed, summary.skipped, summary.duration_ms
        );

        Ok(summary)
    }

    /// Run one scenario in its own browser session
    pub async fn run_test(&self, suite: &SuiteSpec, scenario: &ScenarioSpec, browser: Browser) -> TestResult {
        let start = Instant::now();
        let name = test_name(browser, suite, scenario);
        let test_dir = self.config.output_dir.join(slug(&name));
        let pw = &self.config.playwright;
        let video_dir = pw.video.records().then(|| test_dir.join("video"));

        debug!("Running test: {}", name);

        let mut result = TestResult {
            name,
            suite: suite.name.clone(),
            browser,
            success: false,
            skipped: false,
            duration_ms: 0,
            steps: vec![],
            artifacts: vec![],
            error: None,
        };

        let session = Session::open(
            scenario.scenario.fixture(),
            browser,
            self.config.env.clone(),
            self.config.session.clone(),
            pw,
            video_dir.clone(),
        )
        .await;

        let session = match session {
            Ok(session) => session,
            Err(e) => {
                result.error = Some(e.to_string());
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

        let (outcome, steps) = execute_scenario(&session, suite, scenario, self.config.test_timeout).await;
        let passed = outcome.is_ok();

        if pw.screenshot.keeps(passed) {
            let path = test_dir.join("screenshot.png");
            match session.page().screenshot(&path).await {
                Ok(()) => result.artifacts.push(path),
                Err(e) => warn!("Could not capture screenshot for {}: {}", result.name, e),
            }
        }

        let trace_path = (pw.trace.records() && pw.trace.keeps(passed)).then(|| test_dir.join("trace.zip"));
        if let Err(e) = session.page().close(trace_path.as_deref()).await {
            warn!("Closing browser for {} failed: {}", result.name, e);
        } else if let Some(path) = trace_path {
            result.artifacts.push(path);
        }

        if let Some(dir) = video_dir {
            if pw.video.keeps(passed) {
                result.artifacts.push(dir);
            } else if let Err(e) = remove_dir_if_exists(&dir) {
                debug!("Could not remove video dir {}: {}", dir.display(), e);
            }
        }

        result.success = passed;
        result.error = outcome.err().map(|e| e.to_string());
        result.steps = steps;
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Run `before_each` and the scenario within the per-test timeout
pub async fn execute_scenario<P: Page>(
    session: &Session<P>,
    suite: &SuiteSpec,
    scenario: &ScenarioSpec,
    test_timeout: Duration,
) -> (E2eResult<()>, Vec<StepResult>) {
    let mut steps = StepLog::default();

    let outcome = tokio::time::timeout(test_timeout, async {
        if scenario.scenario.fixture() == Fixture::LoggedIn && !suite.cleanup_files.is_empty() {
            steps.step("Before each: clean up files", suite.before_each(session)).await?;
        }
        scenario.scenario.run(session, &mut steps).await
    })
    .await
    .unwrap_or_else(|_| {
        Err(E2eError::Timeout(format!(
            "test to finish within {} ms",
            test_timeout.as_millis()
        )))
    });

    (outcome, steps.into_steps())
}

/// Run every scenario of `suite` through `run_one`, honouring serial mode
pub async fn run_suite_with<'s, F, Fut>(suite: &'s SuiteSpec, browser: Browser, mut run_one: F) -> Vec<TestResult>
where
    F: FnMut(&'s ScenarioSpec) -> Fut,
    Fut: Future<Output = TestResult>,
{
    let mut results = Vec::with_capacity(suite.scenarios.len());
    if suite.skip {
        info!("Skipping suite {}", suite.name);
        return suite
            .scenarios
            .iter()
            .map(|scenario| TestResult::skipped(suite, scenario, browser))
            .collect();
    }

    let mut failed = false;
    for scenario in &suite.scenarios {
        if failed && suite.serial {
            results.push(TestResult::skipped(suite, scenario, browser));
            continue;
        }

        let result = run_one(scenario).await;
        if result.success {
            info!("✓ {} ({} ms)", result.name, result.duration_ms);
        } else {
            failed = true;
            error!("✗ {} - {}", result.name, result.error.as_deref().unwrap_or("unknown error"));
        }
        results.push(result);
    }

    results
}

fn test_name(browser: Browser, suite: &SuiteSpec, scenario: &ScenarioSpec) -> String {
    format!("[{}] {} › {}", browser, suite.name, scenario.title())
}

/// File-system friendly form of a test name
fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
