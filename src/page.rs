use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{PermissionSetting, SetPermissionParams};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, InsertTextParams,
};
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page as CrPage;

use crate::config::WaitUntil;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::surface::{BoundingBox, ClickOptions, DocumentSurface, Locator};

/// Attribute used to hand a located element from page script to CDP.
const HANDLE_ATTR: &str = "data-autofill-handle";

/// Permission names granted before pasting through the system clipboard.
const CLIPBOARD_PERMISSIONS: &[&str] = &["clipboard-read", "clipboard-write"];

/// Extra quiet period applied for `WaitUntil::NetworkIdle`.
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

/// Wrapper around a chromiumoxide Page that implements [`DocumentSurface`].
pub struct Page {
    inner: CrPage,
    slow_mo: Duration,
    handles: AtomicU64,
}

impl Page {
    pub(crate) fn new(inner: CrPage, slow_mo: Duration) -> Self {
        Self {
            inner,
            slow_mo,
            handles: AtomicU64::new(0),
        }
    }

    fn locate_expr(locator: &Locator) -> Result<String> {
        let steps = serde_json::to_string(locator.steps())?;
        Ok(format!("({LOCATE_JS})({steps})"))
    }

    /// Resolve the first match of `locator` to a CDP element handle.
    async fn element(&self, locator: &Locator) -> Result<Element> {
        let token = self.handles.fetch_add(1, Ordering::Relaxed);
        let mark = format!(
            "(() => {{ const el = {}[0]; if (!el) return false; \
             el.setAttribute('{HANDLE_ATTR}', '{token}'); return true; }})()",
            Self::locate_expr(locator)?
        );
        let found: bool = self
            .inner
            .evaluate(mark)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?
            .into_value()
            .unwrap_or(false);
        if !found {
            return Err(Error::ElementNotFound(locator.to_string()));
        }
        let el = self
            .inner
            .find_element(format!("[{HANDLE_ATTR}='{token}']"))
            .await
            .map_err(|e| Error::ElementNotFound(format!("{locator}: {e}")))?;
        let el = Element::new(el);
        el.call(&format!("function() {{ this.removeAttribute('{HANDLE_ATTR}'); }}"))
            .await?;
        Ok(el)
    }

    async fn pause(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    async fn key_event(&self, kind: DispatchKeyEventType, modifiers: i64) -> Result<()> {
        let params = DispatchKeyEventParams::builder()
            .r#type(kind)
            .modifiers(modifiers)
            .key("v")
            .code("KeyV")
            .windows_virtual_key_code(86)
            .commands(vec!["paste"])
            .build()
            .map_err(Error::ProtocolError)?;
        self.inner.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentSurface for Page {
    async fn goto(&self, url: &str, wait_until: WaitUntil) -> Result<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| Error::NavigationError(e.to_string()))?;
        if wait_until == WaitUntil::NetworkIdle {
            tokio::time::sleep(NETWORK_IDLE_SETTLE).await;
        }
        Ok(())
    }

    async fn count(&self, locator: &Locator) -> Result<usize> {
        let expr = format!("{}.length", Self::locate_expr(locator)?);
        let result = self
            .inner
            .evaluate(expr)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        result
            .into_value::<usize>()
            .map_err(|e| Error::JsError(e.to_string()))
    }

    async fn click(&self, locator: &Locator, options: ClickOptions) -> Result<()> {
        let el = self.element(locator).await?;
        if options.force {
            el.force_click().await?;
        } else {
            el.click().await?;
        }
        self.pause().await;
        Ok(())
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<()> {
        self.inner.click(Point::new(x, y)).await?;
        self.pause().await;
        Ok(())
    }

    async fn check(&self, locator: &Locator, options: ClickOptions) -> Result<()> {
        let el = self.element(locator).await?;
        if el.is_checked().await? {
            return Ok(());
        }
        if options.force {
            el.force_click().await?;
        } else {
            el.click().await?;
        }
        self.pause().await;
        Ok(())
    }

    async fn is_checked(&self, locator: &Locator) -> Result<bool> {
        self.element(locator).await?.is_checked().await
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<()> {
        self.element(locator).await?.select_option(value).await?;
        self.pause().await;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<()> {
        self.element(locator).await?.fill(value).await?;
        self.pause().await;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str, delay: Duration) -> Result<()> {
        self.element(locator).await?.type_text(text, delay).await?;
        self.pause().await;
        Ok(())
    }

    async fn press(&self, locator: &Locator, key: &str) -> Result<()> {
        self.element(locator).await?.press_key(key).await?;
        self.pause().await;
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.inner.execute(InsertTextParams::new(text)).await?;
        self.pause().await;
        Ok(())
    }

    async fn focus(&self, locator: &Locator) -> Result<()> {
        self.element(locator).await?.focus().await
    }

    async fn scroll_into_view(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let el = self.element(locator).await?;
        tokio::time::timeout(timeout, el.scroll_into_view())
            .await
            .map_err(|_| Error::Timeout(format!("scroll to {locator}")))?
    }

    async fn bounding_box(&self, locator: &Locator) -> Result<Option<BoundingBox>> {
        Ok(self.element(locator).await?.bounding_box().await)
    }

    async fn inner_text(&self, locator: &Locator) -> Result<String> {
        self.element(locator).await?.inner_text().await
    }

    async fn is_editable(&self, locator: &Locator) -> Result<bool> {
        self.element(locator).await?.is_editable().await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .inner
            .evaluate(script)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Polls every 100ms until the selector matches or `timeout` elapses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let interval = Duration::from_millis(100);
        let start = std::time::Instant::now();

        loop {
            match self.inner.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(_) if start.elapsed() < timeout => {
                    tokio::time::sleep(interval).await;
                }
                Err(_) => {
                    return Err(Error::Timeout(format!(
                        "Timed out waiting for selector: {}",
                        selector
                    )));
                }
            }
        }
    }

    async fn wait_for_timeout(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn grant_clipboard(&self, origin: &str) -> Result<()> {
        for params in clipboard_grants(origin)? {
            self.inner.execute(params).await?;
        }
        Ok(())
    }

    async fn write_clipboard(&self, text: &str) -> Result<()> {
        let text_js = serde_json::to_string(text)?;
        let js = format!("navigator.clipboard.writeText({text_js}).then(() => true)");
        self.inner
            .evaluate(js)
            .await
            .map_err(|e| Error::JsError(format!("clipboard write: {e}")))?;
        Ok(())
    }

    async fn paste(&self, locator: &Locator) -> Result<()> {
        self.element(locator).await?.focus().await?;
        // Meta on macOS, Control elsewhere.
        let modifiers = if cfg!(target_os = "macos") { 4 } else { 2 };
        self.key_event(DispatchKeyEventType::KeyDown, modifiers).await?;
        self.key_event(DispatchKeyEventType::KeyUp, modifiers).await?;
        self.pause().await;
        Ok(())
    }
}

fn clipboard_grants(origin: &str) -> Result<Vec<SetPermissionParams>> {
    CLIPBOARD_PERMISSIONS
        .iter()
        .map(|name| {
            SetPermissionParams::builder()
                .permission(*name)
                .setting(PermissionSetting::Granted)
                .origin(origin)
                .build()
                .map_err(Error::ProtocolError)
        })
        .collect()
}

/// Page-side locator engine. Takes the serialized `Step` list and returns the
/// matching elements in document order.
static LOCATE_JS: &str = r#"
function (steps) {
    const clean = (s) => (s || '').replace(/\s+/g, ' ').trim();
    const textMatches = (actual, wanted, exact) => {
        const a = clean(actual);
        const w = clean(wanted);
        return exact ? a === w : a.toLowerCase().includes(w.toLowerCase());
    };
    const uniq = (els) => Array.from(new Set(els));
    const textOf = (el) => (el instanceof HTMLElement ? el.innerText : el.textContent) || '';
    const SKIP = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'HEAD', 'TITLE', 'META', 'LINK'];
    const TAGS = "[class*='tag' i], [data-testid*='tag' i], [aria-label*='tag' i], " +
        "[role='combobox'], input:not([type='hidden']), textarea, [contenteditable='true']";

    const css = (roots, sel) => roots === null
        ? Array.from(document.querySelectorAll(sel))
        : uniq(roots.flatMap((r) => Array.from(r.querySelectorAll(sel))));
    const every = (roots) => css(roots, '*').filter((el) => !SKIP.includes(el.tagName));

    const labelsOf = (el) => {
        const out = [];
        const aria = el.getAttribute('aria-label');
        if (aria) out.push(aria);
        const ids = el.getAttribute('aria-labelledby');
        if (ids) {
            ids.split(/\s+/).forEach((id) => {
                const n = document.getElementById(id);
                if (n) out.push(textOf(n));
            });
        }
        if (el.labels) Array.from(el.labels).forEach((l) => out.push(textOf(l)));
        return out;
    };
    const byLabel = (roots, text, exact) =>
        every(roots).filter((el) => labelsOf(el).some((l) => textMatches(l, text, exact)));
    const byPlaceholder = (roots, text, exact) =>
        css(roots, '[placeholder]').filter((el) =>
            textMatches(el.getAttribute('placeholder'), text, exact));
    const byText = (roots, text, exact) => {
        const hits = every(roots).filter((el) => textMatches(textOf(el), text, exact));
        return hits.filter((el) => !hits.some((o) => o !== el && el.contains(o)));
    };
    const followingTags = (roots) => uniq((roots || []).map((anchor) => {
        const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_ELEMENT);
        walker.currentNode = anchor;
        let node = walker.nextNode();
        while (node) {
            if (!anchor.contains(node) && node.matches(TAGS)) return node;
            node = walker.nextNode();
        }
        return null;
    }).filter(Boolean));

    let current = null;
    for (const step of steps) {
        switch (step.kind) {
            case 'css': current = css(current, step.selector); break;
            case 'label': current = byLabel(current, step.text, step.exact); break;
            case 'placeholder': current = byPlaceholder(current, step.text, step.exact); break;
            case 'text': current = byText(current, step.text, step.exact); break;
            case 'following_tags': current = followingTags(current); break;
            case 'nth': {
                const el = (current || [])[step.index];
                current = el ? [el] : [];
                break;
            }
            default: throw new Error('unknown locator step ' + step.kind);
        }
    }
    return current || [];
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipboard_grants_are_scoped_to_origin() {
        let grants = clipboard_grants("https://shop.test").unwrap();
        let json: Vec<serde_json::Value> = grants
            .iter()
            .map(|g| serde_json::to_value(g).unwrap())
            .collect();
        assert_eq!(json.len(), 2);
        assert_eq!(json[0]["permission"]["name"], "clipboard-read");
        assert_eq!(json[1]["permission"]["name"], "clipboard-write");
        for grant in &json {
            assert_eq!(grant["setting"], "granted");
            assert_eq!(grant["origin"], "https://shop.test");
        }
    }
}
