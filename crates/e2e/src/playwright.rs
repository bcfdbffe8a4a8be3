//! Playwright browser automation
//!
//! A [`PlaywrightDriver`] owns a `node` subprocess running a generated
//! bootstrap script. The script launches one browser, one context and one
//! page, then answers requests read from stdin. Each request is a single
//! JSON line carrying an `id` and an `op`; each response is a single JSON
//! line echoing the `id` with either `value` or `error`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::locator::{LoadState, Locator, MouseButton, WaitState};
use crate::page::Page;

/// Environment variable the bootstrap script reads its launch options from
const OPTIONS_ENV: &str = "PORTAL_E2E_DRIVER_OPTIONS";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

/// When to keep a test artifact (screenshot, video, trace)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactMode {
    #[default]
    Off,
    On,
    /// Capture only when the test failed
    OnlyOnFailure,
    /// Always capture, delete again when the test passed
    RetainOnFailure,
}

impl ArtifactMode {
    /// Whether recording has to be enabled up front
    pub fn records(&self) -> bool {
        matches!(self, ArtifactMode::On | ArtifactMode::RetainOnFailure)
    }

    /// Whether the artifact is kept for a test with the given outcome
    pub fn keeps(&self, passed: bool) -> bool {
        match self {
            ArtifactMode::Off => false,
            ArtifactMode::On => true,
            ArtifactMode::OnlyOnFailure | ArtifactMode::RetainOnFailure => !passed,
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Directory whose `node_modules` provides the `playwright` package
    pub node_modules_dir: PathBuf,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub launch_args: Vec<String>,
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
    /// How long to wait for the browser to come up
    pub launch_timeout: Duration,
    pub screenshot: ArtifactMode,
    pub video: ArtifactMode,
    pub trace: ArtifactMode,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_modules_dir: PathBuf::from("node_modules"),
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            launch_args: vec![
                "--disable-autofill".to_string(),
                "--disable-password-manager".to_string(),
                "--no-first-run".to_string(),
            ],
            action_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(60),
            screenshot: ArtifactMode::OnlyOnFailure,
            video: ArtifactMode::RetainOnFailure,
            trace: ArtifactMode::On,
        }
    }
}

/// Per-session launch parameters
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub browser: Browser,
    /// Storage state file to start the context from
    pub storage_state: Option<PathBuf>,
    /// Record video into this directory
    pub video_dir: Option<PathBuf>,
}

/// Options handed to the bootstrap script
#[derive(Debug, Serialize)]
struct DriverOptions<'a> {
    browser: Browser,
    headless: bool,
    viewport: Viewport,
    launch_args: &'a [String],
    action_timeout_ms: u64,
    navigation_timeout_ms: u64,
    storage_state: Option<&'a Path>,
    video_dir: Option<&'a Path>,
    trace: bool,
}

#[derive(Debug, Serialize)]
struct Viewport {
    width: u32,
    height: u32,
}

/// Operations understood by the bootstrap script
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Goto { url: &'a str, wait_until: LoadState },
    Click { target: &'a Locator, button: MouseButton },
    Fill { target: &'a Locator, value: &'a str },
    SetInputFiles { target: &'a Locator, path: &'a Path },
    TextContent { target: &'a Locator },
    AllTextContents { target: &'a Locator },
    IsVisible { target: &'a Locator },
    WaitFor { target: &'a Locator, state: WaitState, timeout_ms: u64 },
    WaitForLoadState { state: LoadState },
    Url,
    Download { target: &'a Locator, button: MouseButton },
    ClearSessionData,
    DismissDialogs,
    SaveStorageState { path: &'a Path },
    Screenshot { path: &'a Path },
    Close { trace_path: Option<&'a Path> },
}

impl DriverCommand<'_> {
    fn name(&self) -> String {
        match self {
            DriverCommand::Goto { url, .. } => format!("goto:{}", url),
            DriverCommand::Click { target, .. } => format!("click:{}", target),
            DriverCommand::Fill { target, .. } => format!("fill:{}", target),
            DriverCommand::SetInputFiles { target, .. } => format!("set_input_files:{}", target),
            DriverCommand::TextContent { target } => format!("text_content:{}", target),
            DriverCommand::AllTextContents { target } => format!("all_text_contents:{}", target),
            DriverCommand::IsVisible { target } => format!("is_visible:{}", target),
            DriverCommand::WaitFor { target, .. } => format!("wait_for:{}", target),
            DriverCommand::WaitForLoadState { state } => format!("wait_for_load_state:{:?}", state),
            DriverCommand::Url => "url".to_string(),
            DriverCommand::Download { target, .. } => format!("download:{}", target),
            DriverCommand::ClearSessionData => "clear_session_data".to_string(),
            DriverCommand::DismissDialogs => "dismiss_dialogs".to_string(),
            DriverCommand::SaveStorageState { .. } => "save_storage_state".to_string(),
            DriverCommand::Screenshot { .. } => "screenshot".to_string(),
            DriverCommand::Close { .. } => "close".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DriverRequest<'a> {
    id: u64,
    #[serde(flatten)]
    command: DriverCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct DriverResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

struct DriverIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A [`Page`] backed by a Playwright subprocess
pub struct PlaywrightDriver {
    io: Mutex<DriverIo>,
    next_id: AtomicU64,
    browser: Browser,
    // Keeps the bootstrap script alive for the lifetime of the process
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Check if Playwright is installed
    pub fn check_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Launch a browser, context and page
    pub async fn launch(config: &PlaywrightConfig, options: LaunchOptions) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, build_script())?;

        let driver_options = DriverOptions {
            browser: options.browser,
            headless: config.headless,
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
            launch_args: &config.launch_args,
            action_timeout_ms: config.action_timeout.as_millis() as u64,
            navigation_timeout_ms: config.navigation_timeout.as_millis() as u64,
            storage_state: options.storage_state.as_deref(),
            video_dir: options.video_dir.as_deref(),
            trace: config.trace.records(),
        };

        debug!("Launching {} via {}", options.browser, script_path.display());

        let node_path = std::fs::canonicalize(&config.node_modules_dir)
            .unwrap_or_else(|_| config.node_modules_dir.clone());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(script_dir.path())
            .env("NODE_PATH", node_path)
            .env(OPTIONS_ENV, serde_json::to_string(&driver_options)?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| E2eError::Driver(format!("Failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Driver("driver stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let browser = options.browser;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(browser = %browser, "[driver] {}", line);
                }
            });
        }

        let mut io = DriverIo {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        let ready = tokio::time::timeout(config.launch_timeout, read_response(&mut io.stdout))
            .await
            .map_err(|_| E2eError::Timeout(format!("{} to launch", options.browser)))??;
        if !ready.ok {
            return Err(E2eError::Driver(
                ready.error.unwrap_or_else(|| "browser launch failed".to_string()),
            ));
        }

        info!("Launched {} (pid: {:?})", options.browser, io.child.id());

        Ok(Self {
            io: Mutex::new(io),
            next_id: AtomicU64::new(1),
            browser: options.browser,
            _script_dir: script_dir,
        })
    }

    pub fn browser(&self) -> Browser {
        self.browser
    }

    /// Send one command and wait for its response value
    async fn send(&self, command: DriverCommand<'_>) -> E2eResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = command.name();
        let mut line = serde_json::to_string(&DriverRequest { id, command })?;
        line.push('\n');

        let mut io = self.io.lock().await;
        debug!("-> {} {}", id, name);
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let response = read_response(&mut io.stdout).await?;
        if response.id != id {
            return Err(E2eError::Protocol(format!(
                "expected response {} for {}, got {}",
                id, name, response.id
            )));
        }

        if response.ok {
            Ok(response.value)
        } else {
            Err(E2eError::StepFailed {
                step: name,
                reason: response.error.unwrap_or_else(|| "unknown driver error".to_string()),
            })
        }
    }

    /// Send SIGTERM, then kill
    fn terminate(io: &mut DriverIo) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = io.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        let _ = io.child.start_kill();
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        Self::terminate(self.io.get_mut());
    }
}

async fn read_response(stdout: &mut Lines<BufReader<ChildStdout>>) -> E2eResult<DriverResponse> {
    loop {
        match stdout.next_line().await? {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => {
                return serde_json::from_str(&line)
                    .map_err(|e| E2eError::Protocol(format!("bad response {:?}: {}", line, e)));
            }
            None => return Err(E2eError::Driver("driver exited unexpectedly".to_string())),
        }
    }
}

fn string_value(value: serde_json::Value) -> E2eResult<Option<String>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        other => Err(E2eError::Protocol(format!("expected string, got {}", other))),
    }
}

#[async_trait]
impl Page for PlaywrightDriver {
    async fn goto(&self, url: &str, wait_until: LoadState) -> E2eResult<()> {
        self.send(DriverCommand::Goto { url, wait_until }).await?;
        Ok(())
    }

    async fn click(&self, target: &Locator, button: MouseButton) -> E2eResult<()> {
        self.send(DriverCommand::Click { target, button }).await?;
        Ok(())
    }

    async fn fill(&self, target: &Locator, value: &str) -> E2eResult<()> {
        self.send(DriverCommand::Fill { target, value }).await?;
        Ok(())
    }

    async fn set_input_files(&self, target: &Locator, path: &Path) -> E2eResult<()> {
        self.send(DriverCommand::SetInputFiles { target, path }).await?;
        Ok(())
    }

    async fn text_content(&self, target: &Locator) -> E2eResult<Option<String>> {
        string_value(self.send(DriverCommand::TextContent { target }).await?)
    }

    async fn all_text_contents(&self, target: &Locator) -> E2eResult<Vec<String>> {
        let value = self.send(DriverCommand::AllTextContents { target }).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn is_visible(&self, target: &Locator) -> E2eResult<bool> {
        let value = self.send(DriverCommand::IsVisible { target }).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn wait_for(&self, target: &Locator, state: WaitState, timeout: Duration) -> E2eResult<()> {
        self.send(DriverCommand::WaitFor {
            target,
            state,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await?;
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()> {
        self.send(DriverCommand::WaitForLoadState { state }).await?;
        Ok(())
    }

    async fn url(&self) -> E2eResult<String> {
        Ok(string_value(self.send(DriverCommand::Url).await?)?.unwrap_or_default())
    }

    async fn download(&self, target: &Locator, button: MouseButton) -> E2eResult<Option<PathBuf>> {
        let value = self.send(DriverCommand::Download { target, button }).await?;
        Ok(string_value(value)?.map(PathBuf::from))
    }

    async fn clear_session_data(&self) -> E2eResult<()> {
        self.send(DriverCommand::ClearSessionData).await?;
        Ok(())
    }

    async fn dismiss_dialogs(&self) -> E2eResult<()> {
        self.send(DriverCommand::DismissDialogs).await?;
        Ok(())
    }

    async fn save_storage_state(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.send(DriverCommand::SaveStorageState { path }).await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.send(DriverCommand::Screenshot { path }).await?;
        Ok(())
    }

    async fn close(&self, trace_path: Option<&Path>) -> E2eResult<()> {
        if let Some(parent) = trace_path.and_then(Path::parent) {
            std::fs::create_dir_all(parent)?;
        }
        self.send(DriverCommand::Close { trace_path }).await?;

        let mut io = self.io.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), io.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!("Driver for {} exited with {}", self.browser, status);
            }
            Err(_) => {
                warn!("Driver for {} did not exit, terminating", self.browser);
                Self::terminate(&mut io);
            }
        }
        Ok(())
    }
}

/// Build the Node bootstrap script
pub fn build_script() -> String {
    let mut script = String::new();

    script.push_str(
        r#"
const readline = require('readline');
const playwright = require('playwright');

const options = JSON.parse(process.env.PORTAL_E2E_DRIVER_OPTIONS || '{}');

function resolve(root, l) {
  switch (l.kind) {
    case 'css': return root.locator(l.selector);
    case 'role': return root.getByRole(l.role, { name: new RegExp(l.name, 'i') });
    case 'text': return root.getByText(l.text, { exact: l.exact });
    case 'chain': return resolve(resolve(root, l.parent), l.child);
    case 'has_text': return resolve(root, l.base).filter({ hasText: l.text });
    default: throw new Error('unknown locator kind: ' + l.kind);
  }
}

function reply(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}
"#,
    );

    script.push_str(
        r#"
(async () => {
  const browser = await playwright[options.browser].launch({
    headless: options.headless,
    args: options.browser === 'chromium' ? options.launch_args : [],
  });
  const contextOptions = { viewport: options.viewport, acceptDownloads: true };
  if (options.storage_state) contextOptions.storageState = options.storage_state;
  if (options.video_dir) contextOptions.recordVideo = { dir: options.video_dir };
  const context = await browser.newContext(contextOptions);
  context.setDefaultTimeout(options.action_timeout_ms);
  context.setDefaultNavigationTimeout(options.navigation_timeout_ms);
  if (options.trace) await context.tracing.start({ screenshots: true, snapshots: true });
  const page = await context.newPage();
  let dialogsHooked = false;

  const handlers = {
    goto: async (r) => { await page.goto(r.url, { waitUntil: r.wait_until }); return null; },
    click: async (r) => { await resolve(page, r.target).first().click({ button: r.button }); return null; },
    fill: async (r) => { await resolve(page, r.target).first().fill(r.value); return null; },
    set_input_files: async (r) => { await resolve(page, r.target).first().setInputFiles(r.path); return null; },
    text_content: async (r) => {
      const loc = resolve(page, r.target).first();
      if ((await loc.count()) === 0) return null;
      return await loc.textContent();
    },
    all_text_contents: async (r) => await resolve(page, r.target).allTextContents(),
    is_visible: async (r) => await resolve(page, r.target).first().isVisible().catch(() => false),
    wait_for: async (r) => {
      await resolve(page, r.target).first().waitFor({ state: r.state, timeout: r.timeout_ms });
      return null;
    },
    wait_for_load_state: async (r) => { await page.waitForLoadState(r.state); return null; },
    url: async () => page.url(),
    download: async (r) => {
      const [download] = await Promise.all([
        page.waitForEvent('download'),
        resolve(page, r.target).first().click({ button: r.button }),
      ]);
      return await download.path();
    },
    clear_session_data: async () => {
      await context.clearCookies();
      await context.clearPermissions();
      await page.evaluate(() => {
        try { localStorage.clear(); sessionStorage.clear(); } catch (e) { /* opaque origin */ }
      });
      return null;
    },
    dismiss_dialogs: async () => {
      if (!dialogsHooked) {
        page.on('dialog', (dialog) => dialog.dismiss().catch(() => null));
        dialogsHooked = true;
      }
      return null;
    },
    save_storage_state: async (r) => { await context.storageState({ path: r.path }); return null; },
    screenshot: async (r) => { await page.screenshot({ path: r.path, fullPage: true }); return null; },
    close: async (r) => {
      if (options.trace) await context.tracing.stop(r.trace_path ? { path: r.trace_path } : undefined);
      await context.close();
      await browser.close();
      return null;
    },
  };

  reply({ id: 0, ok: true, value: 'ready' });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let request;
    try {
      request = JSON.parse(line);
    } catch (error) {
      reply({ id: 0, ok: false, error: 'bad request: ' + error.message });
      continue;
    }
    const handler = handlers[request.op];
    if (!handler) {
      reply({ id: request.id, ok: false, error: 'unknown op: ' + request.op });
      continue;
    }
    try {
      const value = await handler(request);
      reply({ id: request.id, ok: true, value: value === undefined ? null : value });
    } catch (error) {
      reply({ id: request.id, ok: false, error: error.message });
    }
    if (request.op === 'close') break;
  }
  process.exit(0);
})().catch((error) => {
  reply({ id: 0, ok: false, error: error.message });
  process.stderr.write(String(error.stack) + '\n');
  process.exit(1);
});
"#,
    );

    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let target = Locator::css("input[name=\"Email\"]");
        let request = DriverRequest {
            id: 7,
            command: DriverCommand::Fill { target: &target, value: "a@b.c" },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["op"], "fill");
        assert_eq!(json["target"]["kind"], "css");
        assert_eq!(json["value"], "a@b.c");

        let url = DriverRequest { id: 8, command: DriverCommand::Url };
        assert_eq!(serde_json::to_string(&url).unwrap(), r#"{"id":8,"op":"url"}"#);
    }

    #[test]
    fn test_script_handles_every_op() {
        let script = build_script();
        for op in [
            "goto:", "click:", "fill:", "set_input_files:", "text_content:", "all_text_contents:",
            "is_visible:", "wait_for:", "wait_for_load_state:", "url:", "download:",
            "clear_session_data:", "dismiss_dialogs:", "save_storage_state:", "screenshot:", "close:",
        ] {
            assert!(script.contains(op), "missing handler {}", op);
        }
        assert!(script.contains(OPTIONS_ENV));
    }

    #[test]
    fn test_response_parsing() {
        let ok: DriverResponse = serde_json::from_str(r#"{"id":3,"ok":true,"value":"Uploaded"}"#).unwrap();
        assert!(ok.ok);
        assert_eq!(string_value(ok.value).unwrap().as_deref(), Some("Uploaded"));

        let err: DriverResponse = serde_json::from_str(r#"{"id":4,"ok":false,"error":"Timeout 5000ms"}"#).unwrap();
        assert!(!err.ok);
        assert_eq!(err.error.as_deref(), Some("Timeout 5000ms"));
        assert_eq!(string_value(err.value).unwrap(), None);
    }

    #[test]
    fn test_artifact_modes() {
        assert!(ArtifactMode::RetainOnFailure.records());
        assert!(!ArtifactMode::OnlyOnFailure.records());
        assert!(ArtifactMode::RetainOnFailure.keeps(false));
        assert!(!ArtifactMode::RetainOnFailure.keeps(true));
        assert!(ArtifactMode::On.keeps(true));
        assert!(!ArtifactMode::Off.keeps(false));
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert_eq!("chrome".parse::<Browser>().unwrap(), Browser::Chromium);
        assert!("lynx".parse::<Browser>().is_err());
    }
}
