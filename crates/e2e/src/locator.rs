//! Element locators and wait states understood by the driver

use std::fmt;

use serde::{Deserialize, Serialize};

/// How to find an element on the page
///
/// Serialized as JSON and resolved by the driver against Playwright's
/// locator API, so the variants mirror what Playwright can express.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// CSS (or Playwright engine-prefixed) selector
    Css { selector: String },

    /// ARIA role with an accessible name, matched case-insensitively as a regex
    Role { role: String, name: String },

    /// Visible text
    Text { text: String, exact: bool },

    /// `child` resolved inside `parent`
    Chain { parent: Box<Locator>, child: Box<Locator> },

    /// `base` narrowed to elements containing `text`
    HasText { base: Box<Locator>, text: String },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css { selector: selector.into() }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role { role: role.into(), name: name.into() }
    }

    pub fn button(name: impl Into<String>) -> Self {
        Self::role("button", name)
    }

    pub fn link(name: impl Into<String>) -> Self {
        Self::role("link", name)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into(), exact: false }
    }

    pub fn exact_text(text: impl Into<String>) -> Self {
        Locator::Text { text: text.into(), exact: true }
    }

    /// Resolve `child` relative to this locator
    pub fn then(self, child: Locator) -> Self {
        Locator::Chain {
            parent: Box::new(self),
            child: Box::new(child),
        }
    }

    /// Keep only matches containing `text`
    pub fn has_text(self, text: impl Into<String>) -> Self {
        Locator::HasText {
            base: Box::new(self),
            text: text.into(),
        }
    }

    /// The parent element of this locator
    pub fn parent(self) -> Self {
        self.then(Locator::css(".."))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "{}", selector),
            Locator::Role { role, name } => write!(f, "role={}[name=/{}/i]", role, name),
            Locator::Text { text, exact: true } => write!(f, "text=\"{}\"", text),
            Locator::Text { text, exact: false } => write!(f, "text={}", text),
            Locator::Chain { parent, child } => write!(f, "{} >> {}", parent, child),
            Locator::HasText { base, text } => write!(f, "{}:has-text(\"{}\")", base, text),
        }
    }
}

/// Element states for `wait_for`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// Page load states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    #[default]
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}
