use std::time::Duration;

use chromiumoxide::element::Element as CrElement;

use crate::error::{Error, Result};
use crate::surface::BoundingBox;

/// Wrapper around a chromiumoxide Element, exposing the interactions a form field needs.
pub struct Element {
    inner: CrElement,
}

impl Element {
    pub(crate) fn new(inner: CrElement) -> Self {
        Self { inner }
    }

    /// Click this element with a real mouse event (scrolls into view first).
    pub async fn click(&self) -> Result<()> {
        self.inner.click().await?;
        Ok(())
    }

    /// Dispatch `HTMLElement.click()` directly, bypassing visibility and hit-testing.
    pub async fn force_click(&self) -> Result<()> {
        self.call("function() { this.click(); }").await?;
        Ok(())
    }

    /// Type `text` one character at a time, pausing `delay` between keys.
    pub async fn type_text(&self, text: &str, delay: Duration) -> Result<()> {
        self.inner.focus().await?;
        if delay.is_zero() {
            self.inner.type_str(text).await?;
            return Ok(());
        }
        let mut buf = [0u8; 4];
        for c in text.chars() {
            self.inner.type_str(c.encode_utf8(&mut buf)).await?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Press a key on this element (e.g. "Enter", "Tab").
    pub async fn press_key(&self, key: &str) -> Result<()> {
        self.inner.focus().await?;
        self.inner.press_key(key).await?;
        Ok(())
    }

    pub async fn focus(&self) -> Result<()> {
        self.inner.focus().await?;
        Ok(())
    }

    pub async fn scroll_into_view(&self) -> Result<()> {
        self.inner.scroll_into_view().await?;
        Ok(())
    }

    /// Layout box in viewport coordinates, or `None` when the element is not rendered.
    pub async fn bounding_box(&self) -> Option<BoundingBox> {
        let b = self.inner.bounding_box().await.ok()?;
        Some(BoundingBox {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
        })
    }

    pub async fn inner_text(&self) -> Result<String> {
        Ok(self.inner.inner_text().await?.unwrap_or_default())
    }

    /// Set the value in one step, going through the native setter so
    /// framework-controlled inputs see the change.
    pub async fn fill(&self, value: &str) -> Result<()> {
        let value_js = serde_json::to_string(value)?;
        let js = format!(
            r#"function() {{
                const v = {value_js};
                this.focus();
                if (this.isContentEditable) {{
                    this.textContent = v;
                }} else {{
                    const proto = this instanceof HTMLTextAreaElement
                        ? HTMLTextAreaElement.prototype
                        : HTMLInputElement.prototype;
                    const desc = Object.getOwnPropertyDescriptor(proto, 'value');
                    if (desc && desc.set) desc.set.call(this, v); else this.value = v;
                }}
                this.dispatchEvent(new Event('input', {{ bubbles: true }}));
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }}"#
        );
        self.call(&js).await?;
        Ok(())
    }

    /// Select the option whose value or visible label equals `value`.
    pub async fn select_option(&self, value: &str) -> Result<()> {
        let value_js = serde_json::to_string(value)?;
        let js = format!(
            r#"function() {{
                const v = {value_js};
                const opt = Array.from(this.options || []).find(
                    o => o.value === v || (o.label || o.text || '').trim() === v.trim()
                );
                if (!opt) return false;
                this.value = opt.value;
                opt.selected = true;
                this.dispatchEvent(new Event('input', {{ bubbles: true }}));
                this.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }}"#
        );
        match self.call(&js).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(Error::ElementNotFound(format!("option {value:?}"))),
        }
    }

    pub async fn is_checked(&self) -> Result<bool> {
        let v = self
            .call(
                "function() { return ('checked' in this) ? !!this.checked \
                 : this.getAttribute('aria-checked') === 'true'; }",
            )
            .await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    pub async fn is_editable(&self) -> Result<bool> {
        let v = self
            .call(
                "function() { return this.isContentEditable \
                 || (this.matches('input, textarea') && !this.disabled && !this.readOnly) \
                 || this.getAttribute('role') === 'textbox'; }",
            )
            .await?;
        Ok(v.as_bool().unwrap_or(false))
    }

    /// Run `function_declaration` with `this` bound to the element and return its value.
    pub async fn call(&self, function_declaration: &str) -> Result<serde_json::Value> {
        let returns = self.inner.call_js_fn(function_declaration, true).await?;
        if let Some(details) = returns.exception_details {
            return Err(Error::JsError(details.text));
        }
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}
