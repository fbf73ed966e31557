//! Browser automation capability used by the crawl.
//!
//! The catalog paginates through ASP.NET postbacks, so the crawl needs a real
//! browser session. [`BrowserDriver`] narrows that session to the four things
//! traversal uses: navigate, evaluate, query and click. Two backends implement
//! it: [`ChromiumDriver`](super::ChromiumDriver) over the DevTools protocol and
//! [`WebDriverSession`](super::WebDriverSession) over W3C WebDriver.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::user_agent::DEFAULT_USER_AGENT;

/// Attribute the snapshot script stamps on every element it returns.
pub const REF_ATTRIBUTE: &str = "data-harvest-ref";

/// Longest outer HTML kept per element snapshot.
const MAX_OUTER_HTML_CHARS: usize = 2000;

/// Errors raised by a browser backend.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The browser or remote session could not be started.
    #[error("failed to start browser: {0}")]
    Launch(String),

    /// Navigation failed or the page did not load.
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A script threw or returned something unusable.
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// The element is no longer in the document.
    #[error("element {0} is no longer attached to the page")]
    StaleElement(String),

    /// A WebDriver endpoint answered with an error payload.
    #[error("webdriver error {error}: {message}")]
    Protocol { error: String, message: String },

    /// The WebDriver endpoint could not be reached.
    #[error("webdriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A browser operation exceeded its deadline.
    #[error("browser operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Browser session settings shared by both backends.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Chrome/Chromium executable. `None` lets the backend locate one.
    pub chrome_binary: Option<PathBuf>,
    pub headless: bool,
    pub user_agent: String,
    /// Deadline for a single page load.
    pub page_load_timeout: Duration,
    /// W3C WebDriver endpoint for the fallback backend.
    pub webdriver_url: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            chrome_binary: None,
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_load_timeout: Duration::from_secs(30),
            webdriver_url: None,
        }
    }
}

impl BrowserOptions {
    /// Command-line switches passed to Chrome by both backends.
    #[must_use]
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--user-agent={}", self.user_agent),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-notifications".to_string(),
            "--lang=he-IL".to_string(),
            "--window-size=1280,720".to_string(),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }
        args
    }
}

/// Plain-data view of a DOM element, captured by [`snapshot_script`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    /// Value of [`REF_ATTRIBUTE`], used to find the element again for clicks.
    pub reference: String,
    /// Lowercase tag name.
    pub tag: String,
    pub id: String,
    pub class_name: String,
    /// Resolved `href`, if the element has one.
    pub href: Option<String>,
    pub text: String,
    pub aria_label: String,
    /// Outer HTML, truncated.
    pub outer_html: String,
    /// Non-zero rendered box and not hidden by CSS.
    pub visible: bool,
    /// `disabled` property/attribute or a `disabled` class.
    pub disabled: bool,
}

impl ElementSnapshot {
    /// CSS selector matching exactly this element.
    #[must_use]
    pub fn ref_selector(&self) -> String {
        format!("[{REF_ATTRIBUTE}='{}']", self.reference)
    }

    /// True when the element or its markup says it is disabled.
    #[must_use]
    pub fn looks_disabled(&self) -> bool {
        self.disabled || self.outer_html.to_ascii_lowercase().contains("disabled")
    }

    /// Visible and not disabled.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.visible && !self.looks_disabled()
    }
}

/// JavaScript expression returning an [`ElementSnapshot`] array for every
/// element matching `selector`. Invalid selectors yield an empty array.
#[must_use]
pub fn snapshot_script(selector: &str) -> String {
    let selector_json =
        serde_json::to_string(selector).unwrap_or_else(|_| "\"__invalid__\"".to_string());
    format!(
        r"(() => {{
  let nodes;
  try {{
    nodes = Array.from(document.querySelectorAll({selector_json}));
  }} catch (e) {{
    return [];
  }}
  return nodes.map((el) => {{
    let ref = el.getAttribute('{REF_ATTRIBUTE}');
    if (!ref) {{
      window.__harvestRef = (window.__harvestRef || 0) + 1;
      ref = String(window.__harvestRef);
      el.setAttribute('{REF_ATTRIBUTE}', ref);
    }}
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    const cls = typeof el.className === 'string' ? el.className : '';
    const outer = el.outerHTML || '';
    return {{
      reference: ref,
      tag: el.tagName.toLowerCase(),
      id: el.id || '',
      className: cls,
      href: el.hasAttribute('href') ? (el.href || el.getAttribute('href')) : null,
      text: (el.innerText || el.textContent || '').trim(),
      ariaLabel: el.getAttribute('aria-label') || '',
      outerHtml: outer.slice(0, {MAX_OUTER_HTML_CHARS}),
      visible: rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none',
      disabled: el.disabled === true || el.hasAttribute('disabled')
        || /(^|\s)disabled(\s|$)/i.test(cls),
    }};
  }});
}})()"
    )
}

/// Expression returning `document.readyState`.
pub const READY_STATE_SCRIPT: &str = "document.readyState";

/// Expression returning the current location.
pub const LOCATION_SCRIPT: &str = "window.location.href";

/// Parses the value returned by [`snapshot_script`].
///
/// # Errors
///
/// Returns [`DriverError::Script`] if the value is not a snapshot array.
pub fn parse_snapshots(value: Value) -> Result<Vec<ElementSnapshot>, DriverError> {
    match value {
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other).map_err(|e| DriverError::Script(e.to_string())),
    }
}

/// A single, sequential browser session.
///
/// Methods take `&mut self`: one page, one operation at a time.
#[async_trait]
pub trait BrowserDriver: Send {
    /// Loads `url` and waits for the backend's load event.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Evaluates a JavaScript expression and returns its JSON value.
    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError>;

    /// Snapshots every element matching a CSS selector, in document order.
    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, DriverError> {
        let value = self.evaluate(&snapshot_script(selector)).await?;
        parse_snapshots(value)
    }

    /// Clicks a previously snapshotted element.
    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), DriverError>;

    /// URL of the current document.
    async fn current_url(&mut self) -> Result<String, DriverError> {
        match self.evaluate(LOCATION_SCRIPT).await? {
            Value::String(url) => Ok(url),
            other => Err(DriverError::Script(format!(
                "location is not a string: {other}"
            ))),
        }
    }

    /// Ends the session. Further calls are undefined.
    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
