use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::browser::AutofillBrowser;
use crate::error::Result;

pub struct BrowserConfig {
    pub headless: bool,
    /// Add Chrome flags that hide the automation banner and `webdriver` hints.
    pub stealth: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub chrome_path: Option<String>,
    /// Persistent profile directory. When unset Chrome runs with a throwaway profile.
    pub user_data_dir: Option<PathBuf>,
    /// Pause inserted after every mutating page operation.
    pub slow_mo: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            stealth: true,
            viewport_width: 1440,
            viewport_height: 900,
            chrome_path: None,
            user_data_dir: None,
            slow_mo: Duration::ZERO,
        }
    }
}

pub struct BrowserBuilder {
    config: BrowserConfig,
}

impl BrowserBuilder {
    pub fn new() -> Self {
        Self {
            config: BrowserConfig::default(),
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    pub fn stealth(mut self, stealth: bool) -> Self {
        self.config.stealth = stealth;
        self
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn chrome_path(mut self, path: impl Into<String>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Reuse a persistent profile so logins survive between runs.
    pub fn user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.user_data_dir = Some(dir.into());
        self
    }

    pub fn slow_mo(mut self, slow_mo: Duration) -> Self {
        self.config.slow_mo = slow_mo;
        self
    }

    pub fn build_config(self) -> BrowserConfig {
        self.config
    }

    pub async fn build(self) -> Result<AutofillBrowser> {
        AutofillBrowser::launch(self.build_config()).await
    }
}

impl Default for BrowserBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Navigation readiness policy used when opening the schema URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Commit,
    #[default]
    DomContentLoaded,
    Load,
    NetworkIdle,
}

/// Asymmetric jitter window around a base delay: `[base - below, base + above]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct JitterBounds {
    pub below: u64,
    pub above: u64,
}

impl JitterBounds {
    pub const TYPING: JitterBounds = JitterBounds { below: 40, above: 60 };
    pub const PACING: JitterBounds = JitterBounds { below: 120, above: 220 };
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentifierOptions {
    /// Record key the identifier is read from and written back to.
    pub key: String,
    /// Where the last issued identifier is persisted.
    #[serde(alias = "lastSkuFile")]
    pub last_file: Option<PathBuf>,
    /// Seed used when nothing usable has been persisted yet.
    pub start: Option<String>,
}

impl Default for IdentifierOptions {
    fn default() -> Self {
        Self {
            key: "sku".to_string(),
            last_file: None,
            start: None,
        }
    }
}

impl IdentifierOptions {
    pub const DEFAULT_FILE: &'static str = ".last-sku";

    pub fn store_path(&self) -> PathBuf {
        self.last_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_FILE))
    }
}

/// Global options of a schema. Every recognized key is listed here with its default;
/// unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Base per-keystroke delay. Zero means values are set directly.
    pub typing_delay_ms: u64,
    /// Base pause between consecutive fields.
    pub between_fields_delay_ms: u64,
    pub slow_mo_ms: u64,
    pub wait_until: WaitUntil,
    pub wait_for_selector: Option<String>,
    pub wait_for_selector_timeout_ms: u64,
    pub pause_before_fill_ms: u64,
    pub pause_after_draft_ms: u64,
    pub pause_for_manual_start: bool,
    pub pause_for_review: bool,
    pub click_draft: bool,
    pub click_save_progress: bool,
    pub scroll_timeout_ms: u64,
    pub typing_jitter: JitterBounds,
    pub pacing_jitter: JitterBounds,
    #[serde(alias = "sku")]
    pub identifier: IdentifierOptions,
    pub user_data_dir: Option<PathBuf>,
    /// Origin the clipboard permission is granted to. Defaults to the schema URL's origin.
    pub clipboard_origin: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            typing_delay_ms: 0,
            between_fields_delay_ms: 0,
            slow_mo_ms: 0,
            wait_until: WaitUntil::default(),
            wait_for_selector: None,
            wait_for_selector_timeout_ms: 120_000,
            pause_before_fill_ms: 0,
            pause_after_draft_ms: 0,
            pause_for_manual_start: false,
            pause_for_review: false,
            click_draft: false,
            click_save_progress: false,
            scroll_timeout_ms: 2_000,
            typing_jitter: JitterBounds::TYPING,
            pacing_jitter: JitterBounds::PACING,
            identifier: IdentifierOptions::default(),
            user_data_dir: None,
            clipboard_origin: None,
        }
    }
}

impl RunOptions {
    pub const SAFE_SLOW_MO_MS: u64 = 100;
    pub const SAFE_TYPING_DELAY_MS: u64 = 90;
    pub const SAFE_BETWEEN_FIELDS_MS: u64 = 300;

    /// Fill unset pacing options with conservative, human-speed values.
    pub fn apply_safe_defaults(&mut self) {
        if self.slow_mo_ms == 0 {
            self.slow_mo_ms = Self::SAFE_SLOW_MO_MS;
        }
        if self.typing_delay_ms == 0 {
            self.typing_delay_ms = Self::SAFE_TYPING_DELAY_MS;
        }
        if self.between_fields_delay_ms == 0 {
            self.between_fields_delay_ms = Self::SAFE_BETWEEN_FIELDS_MS;
        }
    }

    pub fn scroll_timeout(&self) -> Duration {
        Duration::from_millis(self.scroll_timeout_ms)
    }

    pub fn wait_for_selector_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_for_selector_timeout_ms)
    }
}
