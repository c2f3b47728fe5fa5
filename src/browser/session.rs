use crate::browser::bridge::TabBridge;
use crate::browser::config::LaunchOptions;
use crate::dom::service::{DomService, DomServiceConfig};
use crate::error::{BrowserError, Result};
use headless_chrome::{Browser, Tab};
use std::{ffi::OsStr, sync::Arc, time::Duration};

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // default idle timeout (30s) closes the browser between slow extractions
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = options.chrome_path;
        launch_opts.user_data_dir = options.user_data_dir;
        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        browser
            .new_tab()
            .map_err(|e| BrowserError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        Ok(Self { browser })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(ws_url: impl Into<String>) -> Result<Self> {
        let browser = Browser::connect(ws_url.into()).map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;
        Ok(Self { browser })
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Get all tabs
    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// The visible tab, or the first one when none reports visibility
    pub fn tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        for tab in &tabs {
            match tab.evaluate("document.visibilityState === 'visible'", false) {
                Ok(remote_object) => {
                    if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                        return Ok(Arc::clone(tab));
                    }
                }
                Err(e) => log::debug!("Failed to check tab status: {}", e),
            }
        }

        tabs.into_iter()
            .next()
            .ok_or_else(|| BrowserError::TabOperationFailed("No tab available".to_string()))
    }

    /// Navigate the active tab and wait for the load to finish
    pub fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab()?;
        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationFailed(format!("Navigation timeout: {}", e)))?;

        Ok(())
    }

    /// DOM service over the active tab, running `script` as the extraction function
    pub fn dom_service(&self, script: impl Into<Arc<str>>) -> Result<DomService<TabBridge>> {
        self.dom_service_with_config(script, DomServiceConfig::default())
    }

    pub fn dom_service_with_config(
        &self,
        script: impl Into<Arc<str>>,
        config: DomServiceConfig,
    ) -> Result<DomService<TabBridge>> {
        let bridge = TabBridge::new(self.tab()?, script);
        Ok(DomService::with_config(bridge, config))
    }
}
