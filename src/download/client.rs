//! HTTP client wrapper for fetching PDFs.
//!
//! The client only performs requests and streams bodies to disk while hashing.
//! Verification and promotion decisions belong to the engine.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent::DEFAULT_USER_AGENT;
use crate::verify::{BodyDigest, BodySummary, ResponseMeta};

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// Whole-request timeout, body included.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// HTTP client for streaming downloads.
///
/// Created once and shared by every download task so connections are pooled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Builds a client from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if reqwest rejects the configuration.
    pub fn new(options: &ClientOptions) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .gzip(true)
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(DownloadError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Sends a GET for `url`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] for unparseable or non-http(s) URLs
    /// - [`DownloadError::Timeout`] / [`DownloadError::Network`] for transport failures
    /// - [`DownloadError::HttpStatus`] for non-2xx responses, carrying `Retry-After`
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), "response received");

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Status and raw content type of a response.
#[must_use]
pub fn response_meta(response: &reqwest::Response) -> ResponseMeta {
    ResponseMeta {
        status: response.status().as_u16(),
        content_type: response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string),
    }
}

/// Streams the response body into a fresh file at `path`, hashing as it goes.
///
/// The file is flushed and fsynced before returning. On any error the partial
/// file is removed.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] for filesystem failures and
/// [`DownloadError::Timeout`] / [`DownloadError::Network`] if the body stream
/// breaks.
#[instrument(skip(response), fields(path = %path.display()))]
pub async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<BodySummary, DownloadError> {
    let result = write_body(response, url, path).await;
    if result.is_err() {
        debug!("cleaning up partial file after error");
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

async fn write_body(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<BodySummary, DownloadError> {
    let mut file = File::create(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let mut digest = BodyDigest::new();

    {
        let mut writer = BufWriter::new(&mut file);
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| map_transport_error(url, e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            digest.update(&chunk);
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(path, e))?;
    }

    file.sync_all()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(digest.finish())
}

fn map_transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}
