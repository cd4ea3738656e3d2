//! The document automation surface the interpreter drives.
//!
//! A [`Locator`] is a lazy query: it names *how* to find elements, not a
//! handle to them. Implementations re-run the query on every call, so no
//! element state leaks from one field into the next.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::WaitUntil;
use crate::error::Result;

/// One query step. Each step is evaluated against the matches of the previous
/// step (or the whole document for the first one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Css { selector: String },
    Label { text: String, exact: bool },
    Placeholder { text: String, exact: bool },
    Text { text: String, exact: bool },
    /// First tags control after each match in document order.
    FollowingTags,
    Nth { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Locator {
    steps: Vec<Step>,
}

impl Locator {
    fn from_step(step: Step) -> Self {
        Self { steps: vec![step] }
    }

    fn then(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_step(Step::Css {
            selector: selector.into(),
        })
    }

    pub fn label(text: impl Into<String>, exact: bool) -> Self {
        Self::from_step(Step::Label {
            text: text.into(),
            exact,
        })
    }

    pub fn placeholder(text: impl Into<String>, exact: bool) -> Self {
        Self::from_step(Step::Placeholder {
            text: text.into(),
            exact,
        })
    }

    pub fn text(text: impl Into<String>, exact: bool) -> Self {
        Self::from_step(Step::Text {
            text: text.into(),
            exact,
        })
    }

    /// Descendants of the current matches that match `selector`.
    pub fn locate(&self, selector: impl Into<String>) -> Self {
        self.then(Step::Css {
            selector: selector.into(),
        })
    }

    /// Descendants of the current matches whose text matches.
    pub fn get_by_text(&self, text: impl Into<String>, exact: bool) -> Self {
        self.then(Step::Text {
            text: text.into(),
            exact,
        })
    }

    pub fn following_tags(&self) -> Self {
        self.then(Step::FollowingTags)
    }

    pub fn nth(&self, index: usize) -> Self {
        self.then(Step::Nth { index })
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            match step {
                Step::Css { selector } => write!(f, "css={selector}")?,
                Step::Label { text, .. } => write!(f, "label={text:?}")?,
                Step::Placeholder { text, .. } => write!(f, "placeholder={text:?}")?,
                Step::Text { text, .. } => write!(f, "text={text:?}")?,
                Step::FollowingTags => f.write_str("following-tags")?,
                Step::Nth { index } => write!(f, "nth={index}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Skip actionability checks (visibility, overlap) and dispatch the click anyway.
    pub force: bool,
}

/// Everything the interpreter needs from a live document. Element-targeting
/// methods act on the first match of the locator.
#[async_trait]
pub trait DocumentSurface: Send + Sync {
    async fn goto(&self, url: &str, wait_until: WaitUntil) -> Result<()>;

    async fn count(&self, locator: &Locator) -> Result<usize>;

    async fn click(&self, locator: &Locator, options: ClickOptions) -> Result<()>;

    /// Click at viewport coordinates.
    async fn mouse_click(&self, x: f64, y: f64) -> Result<()>;

    async fn check(&self, locator: &Locator, options: ClickOptions) -> Result<()>;

    async fn is_checked(&self, locator: &Locator) -> Result<bool>;

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Replace the element's value in one step.
    async fn fill(&self, locator: &Locator, value: &str) -> Result<()>;

    /// Send `text` as individual key presses, pausing `delay` between keys.
    async fn type_text(&self, locator: &Locator, text: &str, delay: Duration) -> Result<()>;

    async fn press(&self, locator: &Locator, key: &str) -> Result<()>;

    /// Keyboard-level text insertion into whatever element has focus.
    async fn insert_text(&self, text: &str) -> Result<()>;

    /// Script-level `element.focus()`.
    async fn focus(&self, locator: &Locator) -> Result<()>;

    async fn scroll_into_view(&self, locator: &Locator, timeout: Duration) -> Result<()>;

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>>;

    async fn inner_text(&self, locator: &Locator) -> Result<String>;

    /// Whether the element itself accepts text input.
    async fn is_editable(&self, locator: &Locator) -> Result<bool>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn wait_for_timeout(&self, duration: Duration);

    async fn grant_clipboard(&self, origin: &str) -> Result<()>;

    async fn write_clipboard(&self, text: &str) -> Result<()>;

    /// Paste the clipboard into the element via the platform paste shortcut.
    async fn paste(&self, locator: &Locator) -> Result<()>;
}
