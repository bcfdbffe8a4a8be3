//! Portal E2E Test Framework
//!
//! This crate drives end-to-end UI tests of the portal's login flow and
//! data-transfer module from Rust:
//! - Loads credentials and the base URL from `.env.<TEST_ENV>`
//! - Controls Playwright through a Node subprocess speaking line-delimited JSON
//! - Wraps the portal screens in page objects
//! - Follows uploads until they complete, fail or time out
//! - Runs declarative YAML suites across browser projects
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── prepare()  target check + global_setup() per browser │
//! │    ├── run_suites(suites) -> TestSuiteResult                │
//! │    └── run_test(suite, scenario, browser) -> TestResult     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session<P: Page>                                           │
//! │    ├── LoginPage / DataTransferPage / PopupHandler          │
//! │    └── UploadStateWatcher -> Success | Failure | Timeout    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaywrightDriver: Page                                     │
//! │    └── node driver.js  <-- {"id", "op", ...} per line -->   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod env;
pub mod error;
pub mod locator;
pub mod page;
pub mod pages;
pub mod playwright;
pub mod runner;
pub mod session;
pub mod setup;
pub mod suite;
pub mod target;
pub mod watch;

pub use env::EnvConfig;
pub use error::{E2eError, E2eResult};
pub use locator::Locator;
pub use page::Page;
pub use runner::TestRunner;
pub use session::Session;
pub use suite::{Scenario, SuiteSpec};
pub use watch::{poll_until, UploadStateWatcher, WatchRequest, WatchResult};
