//! W3C WebDriver backend (fallback).
//!
//! Speaks the WebDriver JSON protocol directly to a chromedriver-compatible
//! endpoint. Used when Chrome cannot be driven over DevTools from this process,
//! for example when the browser runs in another container.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use super::driver::{BrowserDriver, BrowserOptions, DriverError, ElementSnapshot};

/// Key under which WebDriver returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Extra time allowed on HTTP calls beyond the page-load deadline.
const TRANSPORT_GRACE: Duration = Duration::from_secs(10);

/// A remote WebDriver session.
#[derive(Debug)]
pub struct WebDriverSession {
    http: Client,
    base_url: String,
    session_id: String,
    closed: bool,
}

impl WebDriverSession {
    /// Opens a new session on the endpoint at `options.webdriver_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Launch`] if no endpoint is configured or the
    /// endpoint refuses to create a session.
    #[instrument(skip(options), fields(endpoint = ?options.webdriver_url))]
    pub async fn connect(options: &BrowserOptions) -> Result<Self, DriverError> {
        let Some(endpoint) = options.webdriver_url.as_deref() else {
            return Err(DriverError::Launch("no WebDriver endpoint configured".to_string()));
        };
        let base_url = endpoint.trim_end_matches('/').to_string();

        let http = Client::builder()
            .timeout(options.page_load_timeout + TRANSPORT_GRACE)
            .build()
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let mut chrome_options = json!({ "args": options.chrome_args() });
        if let Some(binary) = &options.chrome_binary {
            chrome_options["binary"] = json!(binary.display().to_string());
        }
        let page_load_ms = u64::try_from(options.page_load_timeout.as_millis()).unwrap_or(u64::MAX);
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome_options,
                    "timeouts": { "pageLoad": page_load_ms },
                }
            }
        });

        let value = send(&http, Method::POST, &format!("{base_url}/session"), Some(body))
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Launch("session response has no sessionId".to_string()))?
            .to_string();

        info!(session_id = %session_id, "webdriver session started");
        Ok(Self {
            http,
            base_url,
            session_id,
            closed: false,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/session/{}{path}", self.base_url, self.session_id)
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        send(&self.http, method, &self.endpoint(path), body).await
    }
}

/// Sends one WebDriver command and unwraps its `value`.
async fn send(
    http: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    debug!(%method, url, "webdriver command");
    let mut request = http.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    Err(protocol_error(status, &value))
}

fn protocol_error(status: StatusCode, value: &Value) -> DriverError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| format!("HTTP {status}"), str::to_string);
    DriverError::Protocol { error, message }
}

#[async_trait]
impl BrowserDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        match self
            .command(Method::POST, "/url", Some(json!({ "url": url })))
            .await
        {
            Ok(_) => Ok(()),
            Err(DriverError::Protocol { error, message }) => Err(DriverError::Navigation {
                url: url.to_string(),
                message: format!("{error}: {message}"),
            }),
            Err(other) => Err(other),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        let body = json!({ "script": format!("return ({script});"), "args": [] });
        match self.command(Method::POST, "/execute/sync", Some(body)).await {
            Err(DriverError::Protocol { error, message }) if error == "javascript error" => {
                Err(DriverError::Script(message))
            }
            other => other,
        }
    }

    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), DriverError> {
        let found = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": element.ref_selector() })),
            )
            .await;
        let element_id = match found {
            Ok(value) => value
                .get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| DriverError::StaleElement(element.reference.clone()))?,
            Err(DriverError::Protocol { error, .. }) if error == "no such element" => {
                return Err(DriverError::StaleElement(element.reference.clone()));
            }
            Err(other) => return Err(other),
        };

        match self
            .command(
                Method::POST,
                &format!("/element/{element_id}/click"),
                Some(json!({})),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(DriverError::Protocol { error, .. }) if error == "stale element reference" => {
                Err(DriverError::StaleElement(element.reference.clone()))
            }
            Err(other) => Err(other),
        }
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Script(format!("location is not a string: {value}")))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.command(Method::DELETE, "", None).await {
            warn!(error = %e, "webdriver session did not close cleanly");
        }
        Ok(())
    }
}
