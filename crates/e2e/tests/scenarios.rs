//! Scenarios and suite execution against a scripted page

mod common;

use std::time::Duration;

use common::{test_env, test_settings, FakePage};
use portal_e2e::locator::{Locator, WaitState};
use portal_e2e::playwright::Browser;
use portal_e2e::runner::{execute_scenario, run_suite_with, TestResult};
use portal_e2e::session::Session;
use portal_e2e::suite::{ScenarioSpec, StepLog};
use portal_e2e::watch::UploadSurface;
use portal_e2e::{E2eError, Scenario, SuiteSpec};

const DATA_TRANSFER_SUITE: &str = r#"
name: data-transfer
serial: true
cleanup_files: [File1.txt]
scenarios:
  - scenario: file_round_trip
    file: File1.txt
    description: Test file upload 1
  - scenario: invalid_file_type
    file: File3
    description: Test file upload 3
    timeout_ms: 2000
"#;

/// Page showing an open assignment folder
fn data_transfer_page() -> FakePage {
    FakePage::new()
        .with_texts(Locator::css(".folder-item, [data-folder]"), vec![vec!["Inbox", "Opdracht 1"]])
        .with_text(Locator::css(".breadcrumb"), [Some("Home / Opdracht 1")])
}

fn step_names(steps: &[portal_e2e::suite::StepResult]) -> Vec<&str> {
    steps.iter().map(|s| s.step_name.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn invalid_login_uses_wrong_password() {
    let uploads = tempfile::tempdir().unwrap();
    let page = FakePage::new().with_text(
        Locator::css(".validation-summary-errors"),
        [Some("The supplied credentials do not match our records. Please verify them and try again")],
    );
    let session = Session::new(page, Browser::Chromium, test_env(), test_settings(uploads.path()));
    let scenario: ScenarioSpec = serde_yaml::from_str("scenario: invalid_login").unwrap();

    let mut steps = StepLog::default();
    scenario.scenario.run(&session, &mut steps).await.unwrap();

    assert_eq!(
        step_names(steps.steps()),
        vec![
            "Navigate to login page",
            "Attempt login with wrong password",
            "Verify error message is displayed",
        ]
    );
    assert!(session
        .page()
        .actions()
        .contains(&"fill input[name=\"Password\"]=wrong-horse".to_string()));
}

#[tokio::test(start_paused = true)]
async fn successful_login_times_out_as_a_test() {
    let uploads = tempfile::tempdir().unwrap();
    let page = FakePage::new().with_urls(&["https://portal.test/login"]);
    let session = Session::new(page, Browser::Chromium, test_env(), test_settings(uploads.path()));
    let suite = SuiteSpec::from_yaml("name: login\nscenarios:\n  - scenario: successful_login\n").unwrap();

    let (outcome, steps) =
        execute_scenario(&session, &suite, &suite.scenarios[0], Duration::from_secs(1)).await;

    assert!(matches!(outcome, Err(E2eError::Timeout(_))));
    assert_eq!(
        step_names(&steps),
        vec!["Navigate to login page", "Login with valid credentials"]
    );
}

#[tokio::test(start_paused = true)]
async fn file_round_trip_cleans_up_then_uploads_downloads_and_removes() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("File1.txt"), "payload").unwrap();
    let page = data_transfer_page()
        .with_text(UploadSurface::default().status_of("File1.txt"), [Some("Uploading"), Some("Uploaded")])
        .with_visible(Locator::text("File1.txt"), [false])
        .with_download("/tmp/downloads/File1.txt");
    let session = Session::new(page, Browser::Firefox, test_env(), test_settings(uploads.path()));
    let suite = SuiteSpec::from_yaml(DATA_TRANSFER_SUITE).unwrap();

    let (outcome, steps) =
        execute_scenario(&session, &suite, &suite.scenarios[0], Duration::from_secs(60)).await;

    outcome.unwrap();
    assert_eq!(
        step_names(&steps),
        vec![
            "Before each: clean up files",
            "Upload File1.txt",
            "Download File1.txt",
            "Remove File1.txt",
        ]
    );
    assert!(steps.iter().all(|s| s.success));

    let actions = session.page().actions();
    assert!(actions.contains(&"download text=File1.txt Right".to_string()));
    assert_eq!(
        actions.last().unwrap(),
        &format!("wait_for text=File1.txt {:?}", WaitState::Hidden)
    );
}

#[tokio::test(start_paused = true)]
async fn failed_upload_is_reported_on_its_step() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("File1.txt"), "payload").unwrap();
    let page = data_transfer_page()
        .with_text(UploadSurface::default().status_of("File1.txt"), [Some("Uploading")])
        .with_texts(UploadSurface::default().error_banner, vec![vec!["Illegal file type"]]);
    let session = Session::new(page, Browser::Chromium, test_env(), test_settings(uploads.path()));
    let scenario = Scenario::FileRoundTrip {
        file: "File1.txt".to_string(),
        description: "Test file upload 1".to_string(),
        timeout_ms: 5000,
    };

    let mut steps = StepLog::default();
    let err = scenario.run(&session, &mut steps).await.unwrap_err();

    assert!(matches!(err, E2eError::AssertionFailed(ref msg) if msg.contains("Illegal file type")));
    let steps = steps.into_steps();
    assert_eq!(steps.len(), 1);
    assert!(!steps[0].success);
}

#[tokio::test(start_paused = true)]
async fn invalid_file_type_expects_the_error_toast() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("File3"), "MZ").unwrap();
    let page = data_transfer_page()
        .with_text(UploadSurface::default().status_of("File3"), [Some("Uploading")])
        .with_texts(UploadSurface::default().error_banner, vec![vec![], vec!["Illegal file type"]]);
    let session = Session::new(page, Browser::Chromium, test_env(), test_settings(uploads.path()));
    let suite = SuiteSpec::from_yaml(DATA_TRANSFER_SUITE).unwrap();

    let (outcome, steps) =
        execute_scenario(&session, &suite, &suite.scenarios[1], Duration::from_secs(60)).await;

    outcome.unwrap();
    assert_eq!(
        step_names(&steps),
        vec!["Before each: clean up files", "Upload File3", "Verify error toast message"]
    );
}

#[tokio::test(start_paused = true)]
async fn accepted_invalid_file_fails_the_scenario() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("File3"), "MZ").unwrap();
    let page = data_transfer_page().with_text(UploadSurface::default().status_of("File3"), [Some("Uploaded")]);
    let session = Session::new(page, Browser::Chromium, test_env(), test_settings(uploads.path()));
    let suite = SuiteSpec::from_yaml(DATA_TRANSFER_SUITE).unwrap();

    let (outcome, steps) =
        execute_scenario(&session, &suite, &suite.scenarios[1], Duration::from_secs(60)).await;

    let err = outcome.unwrap_err();
    assert!(err.to_string().contains("unexpectedly succeeded"), "{}", err);
    assert!(!steps.last().unwrap().success);
}

fn outcome(name: String, success: bool) -> TestResult {
    TestResult {
        name,
        suite: "data-transfer".to_string(),
        browser: Browser::Chromium,
        success,
        skipped: false,
        duration_ms: 1,
        steps: vec![],
        artifacts: vec![],
        error: (!success).then(|| "boom".to_string()),
    }
}

#[tokio::test]
async fn serial_suite_skips_after_first_failure() {
    let mut suite = SuiteSpec::from_yaml(DATA_TRANSFER_SUITE).unwrap();
    suite.scenarios.push(suite.scenarios[0].clone());
    let mut ran = 0;

    let results = run_suite_with(&suite, Browser::Chromium, |scenario| {
        ran += 1;
        let passed = ran != 2;
        let title = scenario.title();
        async move { outcome(title, passed) }
    })
    .await;

    assert_eq!(ran, 2);
    assert_eq!(results.len(), 3);
    assert!(results[0].success);
    assert!(!results[1].success && !results[1].skipped);
    assert!(results[2].skipped);
    assert_eq!(
        results[2].name,
        "[chromium] data-transfer › Upload, download, and remove File1.txt"
    );
}

#[tokio::test]
async fn parallel_suite_keeps_going_after_failure() {
    let mut suite = SuiteSpec::from_yaml(DATA_TRANSFER_SUITE).unwrap();
    suite.serial = false;
    let mut ran = 0;

    let results = run_suite_with(&suite, Browser::Chromium, |scenario| {
        ran += 1;
        let title = scenario.title();
        async move { outcome(title, false) }
    })
    .await;

    assert_eq!(ran, 2);
    assert!(results.iter().all(|r| !r.success && !r.skipped));
}

#[tokio::test]
async fn skipped_suite_runs_nothing() {
    let mut suite = SuiteSpec::from_yaml(DATA_TRANSFER_SUITE).unwrap();
    suite.skip = true;
    let mut ran = 0;

    let results = run_suite_with(&suite, Browser::Firefox, |scenario| {
        ran += 1;
        let title = scenario.title();
        async move { outcome(title, true) }
    })
    .await;

    assert_eq!(ran, 0);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.skipped));
}
