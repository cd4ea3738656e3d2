#![allow(dead_code)]

//! In-memory document used to drive the executor and runner without Chrome.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use form_autofill::config::WaitUntil;
use form_autofill::surface::{BoundingBox, ClickOptions, DocumentSurface, Locator, Step};
use form_autofill::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub name: String,
    pub tag: String,
    pub selectors: Vec<String>,
    pub text: String,
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub parent: Option<usize>,
    pub checked: bool,
    pub editable: bool,
    pub tags_control: bool,
    pub value: String,
    pub bbox: Option<BoundingBox>,
    pub options: Vec<String>,
}

pub fn el(name: &str, tag: &str) -> FakeElement {
    FakeElement {
        name: name.to_string(),
        tag: tag.to_string(),
        editable: matches!(tag, "input" | "textarea"),
        ..FakeElement::default()
    }
}

impl FakeElement {
    pub fn css(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn inside(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn checked(mut self, checked: bool) -> Self {
        self.checked = checked;
        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn tags_control(mut self) -> Self {
        self.tags_control = true;
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = Some(BoundingBox {
            x,
            y,
            width,
            height,
        });
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|s| s.to_string()).collect();
        self
    }

    fn matches_css(&self, selector: &str) -> bool {
        selector.split(',').map(str::trim).any(|part| {
            let bare = part.split(':').next().unwrap_or(part);
            bare == self.tag || self.selectors.iter().any(|s| s == part)
        })
    }
}

fn text_matches(actual: &str, wanted: &str, exact: bool) -> bool {
    let actual = actual.trim();
    let wanted = wanted.trim();
    if exact {
        actual == wanted
    } else {
        actual.to_lowercase().contains(&wanted.to_lowercase())
    }
}

#[derive(Default)]
pub struct FakeDocument {
    elements: Mutex<Vec<FakeElement>>,
    log: Mutex<Vec<String>>,
    clipboard: Mutex<Option<String>>,
    /// Any operation whose log entry starts with this prefix fails.
    pub fail_on: Option<String>,
    pub deny_clipboard: bool,
    pub clipboard_write_fails: bool,
    pub scroll_fails: bool,
}

impl FakeDocument {
    pub fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements: Mutex::new(elements),
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Log entries that act on the page, without scroll, wait and key-delay noise.
    pub fn actions(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|e| {
                !e.starts_with("scroll:") && !e.starts_with("wait:") && !e.starts_with("keydelay:")
            })
            .collect()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.log()
            .iter()
            .filter_map(|e| e.strip_prefix("wait:"))
            .map(|ms| Duration::from_millis(ms.parse().unwrap()))
            .collect()
    }

    pub fn value_of(&self, name: &str) -> String {
        self.elements
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    pub fn is_checked_by_name(&self, name: &str) -> bool {
        self.elements
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.name == name && e.checked)
    }

    fn record(&self, entry: String) -> Result<()> {
        if let Some(prefix) = &self.fail_on {
            if entry.starts_with(prefix.as_str()) {
                return Err(Error::JsError(format!("injected failure at {entry}")));
            }
        }
        self.log.lock().unwrap().push(entry);
        Ok(())
    }

    fn is_within(elements: &[FakeElement], idx: usize, root: usize) -> bool {
        let mut cur = elements[idx].parent;
        while let Some(p) = cur {
            if p == root {
                return true;
            }
            cur = elements[p].parent;
        }
        false
    }

    fn query(&self, locator: &Locator) -> Vec<usize> {
        let elements = self.elements.lock().unwrap();
        let mut current: Option<Vec<usize>> = None;
        for step in locator.steps() {
            let scoped: Vec<usize> = (0..elements.len())
                .filter(|&i| match &current {
                    None => true,
                    Some(roots) => roots.iter().any(|&r| Self::is_within(&elements, i, r)),
                })
                .collect();
            let next = match step {
                Step::Css { selector } => scoped
                    .into_iter()
                    .filter(|&i| elements[i].matches_css(selector))
                    .collect(),
                Step::Label { text, exact } => scoped
                    .into_iter()
                    .filter(|&i| {
                        elements[i]
                            .label
                            .as_deref()
                            .is_some_and(|l| text_matches(l, text, *exact))
                    })
                    .collect(),
                Step::Placeholder { text, exact } => scoped
                    .into_iter()
                    .filter(|&i| {
                        elements[i]
                            .placeholder
                            .as_deref()
                            .is_some_and(|p| text_matches(p, text, *exact))
                    })
                    .collect(),
                Step::Text { text, exact } => scoped
                    .into_iter()
                    .filter(|&i| !elements[i].text.is_empty())
                    .filter(|&i| text_matches(&elements[i].text, text, *exact))
                    .collect(),
                Step::FollowingTags => {
                    let anchors = current.clone().unwrap_or_default();
                    let mut found: Vec<usize> = anchors
                        .iter()
                        .filter_map(|&a| {
                            (a + 1..elements.len()).find(|&j| {
                                elements[j].tags_control && !Self::is_within(&elements, j, a)
                            })
                        })
                        .collect();
                    found.dedup();
                    found
                }
                Step::Nth { index } => current
                    .clone()
                    .unwrap_or_default()
                    .get(*index)
                    .map(|&i| vec![i])
                    .unwrap_or_default(),
            };
            current = Some(next);
        }
        current.unwrap_or_default()
    }

    fn first(&self, locator: &Locator) -> Result<usize> {
        self.query(locator)
            .first()
            .copied()
            .ok_or_else(|| Error::ElementNotFound(locator.to_string()))
    }

    fn name(&self, idx: usize) -> String {
        self.elements.lock().unwrap()[idx].name.clone()
    }
}

#[async_trait]
impl DocumentSurface for FakeDocument {
    async fn goto(&self, url: &str, _wait_until: WaitUntil) -> Result<()> {
        self.record(format!("goto:{url}"))
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        Ok(self.query(locator).len())
    }

    async fn click(&self, locator: &Locator, options: ClickOptions) -> Result<()> {
        let idx = self.first(locator)?;
        let kind = if options.force { "force_click" } else { "click" };
        self.record(format!("{kind}:{}", self.name(idx)))
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("mouse:{x},{y}"))
    }

    async fn check(&self, locator: &Locator, _options: ClickOptions) -> Result<()> {
        let idx = self.first(locator)?;
        self.record(format!("check:{}", self.name(idx)))?;
        self.elements.lock().unwrap()[idx].checked = true;
        Ok(())
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool> {
        let idx = self.first(locator)?;
        Ok(self.elements.lock().unwrap()[idx].checked)
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()> {
        let idx = self.first(locator)?;
        self.record(format!("select:{}={value}", self.name(idx)))?;
        let mut elements = self.elements.lock().unwrap();
        if !elements[idx].options.iter().any(|o| o == value) {
            return Err(Error::ElementNotFound(format!("option {value:?}")));
        }
        elements[idx].value = value.to_string();
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        let idx = self.first(locator)?;
        self.record(format!("fill:{}={value}", self.name(idx)))?;
        self.elements.lock().unwrap()[idx].value = value.to_string();
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str, delay: Duration) -> Result<()> {
        let idx = self.first(locator)?;
        self.record(format!("type:{}={text}", self.name(idx)))?;
        if !delay.is_zero() {
            self.log.lock().unwrap().push(format!("keydelay:{}", delay.as_millis()));
        }
        self.elements.lock().unwrap()[idx].value.push_str(text);
        Ok(())
    }

    async fn press(&self, locator: &Locator, key: &str) -> Result<()> {
        let idx = self.first(locator)?;
        self.record(format!("press:{}={key}", self.name(idx)))
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.record(format!("insert={text}"))
    }

    async fn focus(&self, locator: &Locator) -> Result<()> {
        let idx = self.first(locator)?;
        self.record(format!("focus:{}", self.name(idx)))
    }

    async fn scroll_into_view(&self, locator: &Locator, _timeout: Duration) -> Result<()> {
        let idx = self.first(locator)?;
        if self.scroll_fails {
            return Err(Error::Timeout(format!("scroll to {locator}")));
        }
        self.record(format!("scroll:{}", self.name(idx)))
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>> {
        let idx = self.first(locator)?;
        Ok(self.elements.lock().unwrap()[idx].bbox)
    }

    async fn inner_text(&self, locator: &Locator) -> Result<String> {
        let idx = self.first(locator)?;
        Ok(self.elements.lock().unwrap()[idx].text.clone())
    }

    async fn is_editable(&self, locator: &Locator) -> Result<bool> {
        let idx = self.first(locator)?;
        Ok(self.elements.lock().unwrap()[idx].editable)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.record(format!("evaluate:{script}"))?;
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        if self.query(&Locator::css(selector)).is_empty() {
            return Err(Error::Timeout(format!(
                "Timed out waiting for selector: {selector}"
            )));
        }
        self.record(format!("ready:{selector}"))
    }

    async fn wait_for_timeout(&self, duration: Duration) {
        self.log
            .lock()
            .unwrap()
            .push(format!("wait:{}", duration.as_millis()));
    }

    async fn grant_clipboard(&self, origin: &str) -> Result<()> {
        if self.deny_clipboard {
            return Err(Error::ProtocolError("permission denied".into()));
        }
        self.record(format!("grant:{origin}"))
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        if self.clipboard_write_fails {
            return Err(Error::JsError("clipboard write: not allowed".into()));
        }
        *self.clipboard.lock().unwrap() = Some(text.to_string());
        Ok(())
    }

    async fn paste(&self, locator: &Locator) -> Result<()> {
        let idx = self.first(locator)?;
        let text = self.clipboard.lock().unwrap().clone().unwrap_or_default();
        self.record(format!("paste:{}={text}", self.name(idx)))
    }
}
