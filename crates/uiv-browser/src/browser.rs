//! Browser lifecycle management using Chrome DevTools Protocol
//!
//! `headless_chrome` is a blocking client; every CDP round trip is moved onto
//! the blocking pool so runner timeouts and cancellation stay responsive.

use crate::driver::{BoundingBox, ElementSnapshot, PageDriver, SessionLauncher};
use crate::query::{click_script, snapshot_script};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uiv_core::{BrowserSettings, Locator, Result, UivError};

/// How long a liveness probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Default bound for CDP waits
    pub timeout: Duration,
    /// Attach to a browser already listening on this DevTools port
    pub connect_port: Option<u16>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self::from_settings(&BrowserSettings::default(), Duration::from_secs(5))
    }
}

impl BrowserConfig {
    pub fn from_settings(settings: &BrowserSettings, timeout: Duration) -> Self {
        Self {
            headless: settings.headless,
            window_width: settings.window_width,
            window_height: settings.window_height,
            user_agent: settings.user_agent.clone(),
            timeout,
            connect_port: None,
        }
    }
}

/// Active browser session with Chrome DevTools Protocol
pub struct BrowserSession {
    /// `None` once closed
    browser: Option<Browser>,
    tab: Arc<Tab>,
    /// Whether closing should end the browser process
    owns_process: bool,
}

impl BrowserSession {
    /// Launch a new browser instance, or attach when `connect_port` is set
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        let owns_process = config.connect_port.is_none();
        let (browser, tab) = tokio::task::spawn_blocking(move || open(&config))
            .await
            .map_err(|e| UivError::Browser(format!("Browser launch task failed: {}", e)))??;

        info!("Browser ready");
        Ok(Self {
            browser: Some(browser),
            tab,
            owns_process,
        })
    }

    /// Run a blocking tab operation off the async executor
    async fn on_tab<T, E, F>(&self, what: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce(&Tab) -> std::result::Result<T, E> + Send + 'static,
    {
        if self.browser.is_none() {
            return Err(UivError::SessionUnavailable("browser session closed".to_string()));
        }
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| UivError::SessionUnavailable(format!("{} task failed: {}", what, e)))?
            .map_err(|e| UivError::Browser(format!("{}: {}", what, e)))
    }

    /// Evaluate a script that returns a JSON string
    async fn evaluate_json(&self, script: String) -> Result<serde_json::Value> {
        let object = self
            .on_tab("JavaScript evaluation failed", move |tab| tab.evaluate(&script, false))
            .await?;

        match object.value {
            Some(serde_json::Value::String(json)) => Ok(serde_json::from_str(&json)?),
            other => Err(UivError::Browser(format!(
                "unexpected script result: {:?}",
                other
            ))),
        }
    }
}

fn open(config: &BrowserConfig) -> Result<(Browser, Arc<Tab>)> {
    let browser = match config.connect_port {
        Some(port) => {
            info!("Connecting to existing browser on port {}", port);
            Browser::connect(format!("http://127.0.0.1:{}", port))
                .map_err(|e| UivError::Browser(format!("Failed to connect to browser: {}", e)))?
        }
        None => {
            info!(
                "Launching browser (headless: {}, size: {}x{})",
                config.headless, config.window_width, config.window_height
            );

            let mut launch_options = LaunchOptions::default_builder()
                .headless(config.headless)
                .window_size(Some((config.window_width, config.window_height)))
                .idle_browser_timeout(config.timeout.max(Duration::from_secs(60)))
                .build()
                .map_err(|e| UivError::Browser(format!("Invalid launch options: {}", e)))?;

            let user_agent_arg = config
                .user_agent
                .as_ref()
                .map(|ua| format!("--user-agent={}", ua));
            if let Some(ref ua_arg) = user_agent_arg {
                launch_options.args.push(OsStr::new(ua_arg));
            }

            Browser::new(launch_options)
                .map_err(|e| UivError::Browser(format!("Failed to launch browser: {}", e)))?
        }
    };

    let tab = browser
        .new_tab()
        .map_err(|e| UivError::Browser(format!("Failed to create tab: {}", e)))?;
    tab.set_default_timeout(config.timeout);

    Ok((browser, tab))
}

#[async_trait]
impl PageDriver for BrowserSession {
    #[instrument(skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let target = url.to_string();
        self.on_tab("Navigation failed", move |tab| {
            tab.navigate_to(&target)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
        })
        .await?;

        info!("Successfully navigated to {}", url);
        Ok(())
    }

    #[instrument(skip(self, attributes), fields(locator = %locator))]
    async fn query(
        &mut self,
        locator: &Locator,
        attributes: &[String],
    ) -> Result<Vec<ElementSnapshot>> {
        let value = self.evaluate_json(snapshot_script(locator, attributes)?).await?;
        let matches: Vec<ElementSnapshot> = serde_json::from_value(value)?;
        debug!("{} match(es)", matches.len());
        Ok(matches)
    }

    #[instrument(skip(self), fields(locator = %locator))]
    async fn click(&mut self, locator: &Locator, index: usize) -> Result<()> {
        self.evaluate_json(click_script(locator, index)?).await?;
        Ok(())
    }

    async fn screenshot(&mut self, clip: Option<BoundingBox>) -> Result<Vec<u8>> {
        let viewport = clip.map(|b| Viewport {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            scale: 1.0,
        });
        self.on_tab("Screenshot failed", move |tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, viewport, true)
        })
        .await
    }

    async fn is_alive(&mut self) -> bool {
        if self.browser.is_none() {
            return false;
        }
        let probe = self.on_tab("Liveness probe failed", |tab| tab.evaluate("1 + 1", false));
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!("Browser session unusable: {}", e);
                false
            }
            Err(_) => {
                warn!("Browser session did not answer within {:?}", PROBE_TIMEOUT);
                false
            }
        }
    }

    fn close(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };
        info!("Closing browser session");
        if !self.owns_process {
            // Leave a borrowed browser running, just drop our tab
            if let Err(e) = self.tab.close(false) {
                debug!("Tab close failed: {}", e);
            }
        }
        drop(browser);
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Launches one Chrome session per run
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        let session = BrowserSession::launch_with_config(self.config.clone()).await?;
        Ok(Box::new(session))
    }
}
