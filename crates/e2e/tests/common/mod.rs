//! Scripted in-memory `Page` for driving page objects without a browser

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use portal_e2e::locator::{LoadState, Locator, MouseButton, WaitState};
use portal_e2e::session::SessionSettings;
use portal_e2e::{E2eError, E2eResult, EnvConfig, Page};

pub const BASE_URL: &str = "https://portal.test";

pub fn test_env() -> EnvConfig {
    EnvConfig::from_lookup(|key| match key {
        "USERNAME" => Some("tester@example.com".to_string()),
        "PASSWORD" => Some("correct-horse".to_string()),
        "WRONG_PASSWORD" => Some("wrong-horse".to_string()),
        "BASE_URL" => Some(BASE_URL.to_string()),
        _ => None,
    })
    .expect("test env is valid")
}

pub fn test_settings(uploads_dir: &Path) -> SessionSettings {
    SessionSettings {
        uploads_dir: uploads_dir.to_path_buf(),
        storage_dir: uploads_dir.join("storage"),
        ..Default::default()
    }
}

/// Values returned in order; the last one repeats
#[derive(Debug, Clone)]
struct Script<T: Clone> {
    values: VecDeque<T>,
}

impl<T: Clone> Script<T> {
    fn new(values: impl IntoIterator<Item = T>) -> Self {
        Self { values: values.into_iter().collect() }
    }

    fn next(&mut self) -> Option<T> {
        if self.values.len() > 1 {
            self.values.pop_front()
        } else {
            self.values.front().cloned()
        }
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    texts: HashMap<Locator, Script<Option<String>>>,
    lists: HashMap<Locator, Script<Vec<String>>>,
    visible: HashMap<Locator, Script<bool>>,
    unreadable: HashSet<Locator>,
    urls: Option<Script<String>>,
    current_url: String,
    download: Option<PathBuf>,
    reads: HashMap<Locator, usize>,
}

#[derive(Default)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successive `text_content` results for `target`
    pub fn with_text<I, S>(self, target: Locator, values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let script = Script::new(values.into_iter().map(|v| v.map(Into::into)));
        self.state.lock().unwrap().texts.insert(target, script);
        self
    }

    /// Successive `all_text_contents` results for `target`
    pub fn with_texts(self, target: Locator, values: Vec<Vec<&str>>) -> Self {
        let script = Script::new(
            values
                .into_iter()
                .map(|v| v.into_iter().map(String::from).collect::<Vec<_>>()),
        );
        self.state.lock().unwrap().lists.insert(target, script);
        self
    }

    pub fn with_visible(self, target: Locator, values: impl IntoIterator<Item = bool>) -> Self {
        self.state.lock().unwrap().visible.insert(target, Script::new(values));
        self
    }

    /// Reads of `target` fail as if the element could not be inspected
    pub fn with_unreadable(self, target: Locator) -> Self {
        self.state.lock().unwrap().unreadable.insert(target);
        self
    }

    /// Successive `url()` results, overriding navigation
    pub fn with_urls(self, values: &[&str]) -> Self {
        self.state.lock().unwrap().urls = Some(Script::new(values.iter().map(|s| s.to_string())));
        self
    }

    pub fn with_download(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().unwrap().download = Some(path.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change the page, without reads
    pub fn actions(&self) -> Vec<String> {
        const READS: [&str; 4] = ["text_content", "all_text_contents", "is_visible", "url"];
        self.calls()
            .into_iter()
            .filter(|c| !READS.iter().any(|r| c == r || c.starts_with(&format!("{} ", r))))
            .collect()
    }

    /// How often `target` was read with `text_content` or `all_text_contents`
    pub fn reads_of(&self, target: &Locator) -> usize {
        self.state.lock().unwrap().reads.get(target).copied().unwrap_or(0)
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _wait_until: LoadState) -> E2eResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("goto {}", url));
        state.current_url = url.to_string();
        Ok(())
    }

    async fn click(&self, target: &Locator, button: MouseButton) -> E2eResult<()> {
        let verb = match button {
            MouseButton::Right => "right_click",
            _ => "click",
        };
        self.record(format!("{} {}", verb, target));
        Ok(())
    }

    async fn fill(&self, target: &Locator, value: &str) -> E2eResult<()> {
        self.record(format!("fill {}={}", target, value));
        Ok(())
    }

    async fn set_input_files(&self, target: &Locator, path: &Path) -> E2eResult<()> {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        self.record(format!("set_input_files {}={}", target, name));
        Ok(())
    }

    async fn text_content(&self, target: &Locator) -> E2eResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("text_content {}", target));
        *state.reads.entry(target.clone()).or_default() += 1;
        if state.unreadable.contains(target) {
            return Err(E2eError::StepFailed {
                step: format!("text_content:{}", target),
                reason: "element is not attached".to_string(),
            });
        }
        Ok(state.texts.get_mut(target).and_then(Script::next).flatten())
    }

    async fn all_text_contents(&self, target: &Locator) -> E2eResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("all_text_contents {}", target));
        *state.reads.entry(target.clone()).or_default() += 1;
        Ok(state.lists.get_mut(target).and_then(Script::next).unwrap_or_default())
    }

    async fn is_visible(&self, target: &Locator) -> E2eResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("is_visible {}", target));
        Ok(state.visible.get_mut(target).and_then(Script::next).unwrap_or(false))
    }

    async fn wait_for(&self, target: &Locator, state: WaitState, _timeout: Duration) -> E2eResult<()> {
        self.record(format!("wait_for {} {:?}", target, state));
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()> {
        self.record(format!("wait_for_load_state {:?}", state));
        Ok(())
    }

    async fn url(&self) -> E2eResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("url".to_string());
        let scripted = state.urls.as_mut().and_then(Script::next);
        Ok(scripted.unwrap_or_else(|| state.current_url.clone()))
    }

    async fn download(&self, target: &Locator, button: MouseButton) -> E2eResult<Option<PathBuf>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("download {} {:?}", target, button));
        Ok(state.download.clone())
    }

    async fn clear_session_data(&self) -> E2eResult<()> {
        self.record("clear_session_data".to_string());
        Ok(())
    }

    async fn dismiss_dialogs(&self) -> E2eResult<()> {
        self.record("dismiss_dialogs".to_string());
        Ok(())
    }

    async fn save_storage_state(&self, path: &Path) -> E2eResult<()> {
        self.record(format!("save_storage_state {}", path.display()));
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        self.record(format!("screenshot {}", path.display()));
        Ok(())
    }

    async fn close(&self, _trace_path: Option<&Path>) -> E2eResult<()> {
        self.record("close".to_string());
        Ok(())
    }
}
