//! Chrome DevTools Protocol backend (primary).

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::driver::{BrowserDriver, BrowserOptions, DriverError, ElementSnapshot};

/// A Chrome instance launched and driven over the DevTools protocol.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    page_load_timeout: Duration,
}

impl std::fmt::Debug for ChromiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumDriver")
            .field("page_load_timeout", &self.page_load_timeout)
            .finish_non_exhaustive()
    }
}

impl ChromiumDriver {
    /// Launches Chrome and opens a blank page.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Launch`] if Chrome cannot be found or started.
    #[instrument(skip(options), fields(headless = options.headless))]
    pub async fn launch(options: &BrowserOptions) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder().request_timeout(options.page_load_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(binary) = &options.chrome_binary {
            builder = builder.chrome_executable(binary);
        }
        for arg in options.chrome_args() {
            if arg.starts_with("--headless") {
                continue;
            }
            builder = builder.arg(arg);
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        page.set_user_agent(options.user_agent.clone())
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        info!("chrome started over devtools");
        Ok(Self {
            browser,
            page,
            handler,
            page_load_timeout: options.page_load_timeout,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        match tokio::time::timeout(self.page_load_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(DriverError::Timeout(self.page_load_timeout)),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(DriverError::Script)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), DriverError> {
        let selector = element.ref_selector();
        let handle = self
            .page
            .find_element(selector.as_str())
            .await
            .map_err(|_| DriverError::StaleElement(element.reference.clone()))?;
        handle
            .click()
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "chrome did not close cleanly");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "waiting for chrome to exit failed");
        }
        self.handler.abort();
        Ok(())
    }
}
