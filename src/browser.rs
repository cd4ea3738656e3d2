use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::{BrowserBuilder, BrowserConfig};
use crate::error::{Error, Result};
use crate::page::Page;

/// Chrome flags that hide the usual automation tells.
/// chromiumoxide adds the `--` prefix itself.
const STEALTH_ARGS: &[&str] = &[
    "disable-infobars",
    "disable-default-apps",
    "no-first-run",
    "no-default-browser-check",
];

const STEALTH_KV_ARGS: &[(&str, &str)] = &[("disable-blink-features", "AutomationControlled")];

/// Runs before any site script on every new document.
const STEALTH_JS: &str = r#"
Object.defineProperty(Navigator.prototype, 'webdriver', {
    get: () => false,
    configurable: true,
    enumerable: true,
});
"#;

/// A launched Chrome instance that hands out pages to fill.
pub struct AutofillBrowser {
    browser: CrBrowser,
    config: BrowserConfig,
    _handler_task: tokio::task::JoinHandle<()>,
}

impl AutofillBrowser {
    /// Create a new BrowserBuilder for configuring and launching a browser.
    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::new()
    }

    /// Launch a browser instance with the given configuration.
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        let mut builder = CrBrowserConfig::builder();

        if config.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        if config.stealth {
            for arg in STEALTH_ARGS {
                builder = builder.arg(*arg);
            }
            for arg in STEALTH_KV_ARGS {
                builder = builder.arg(*arg);
            }
        }

        if let Some(ref dir) = config.user_data_dir {
            info!("Using persistent profile at {}", dir.display());
            builder = builder.user_data_dir(dir);
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder.viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: false,
            has_touch: false,
        });

        let cr_config = builder
            .build()
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let (browser, mut handler) = CrBrowser::launch(cr_config)
            .await
            .map_err(|e| Error::LaunchError(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
            debug!("Browser handler task ended");
        });

        Ok(Self {
            browser,
            config,
            _handler_task: handler_task,
        })
    }

    /// The page to fill. A persistent profile reopens with a tab already
    /// present, which is reused; otherwise a blank tab is opened.
    pub async fn page(&self) -> Result<Page> {
        let existing = self.browser.pages().await?.into_iter().next();
        let cr_page = match existing {
            Some(page) => page,
            None => self
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| Error::NavigationError(e.to_string()))?,
        };

        if self.config.stealth {
            cr_page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS))
                .await
                .map_err(|e| Error::JsError(format!("Failed to inject stealth script: {e}")))?;
        }

        Ok(Page::new(cr_page, self.config.slow_mo))
    }

    /// Close Chrome and wait for the process to exit.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        self.browser.wait().await?;
        Ok(())
    }

    /// Wait for the user to close Chrome.
    pub async fn wait_closed(mut self) -> Result<()> {
        self.browser.wait().await?;
        Ok(())
    }
}
