//! Error types for the download module.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::StateError;
use crate::verify::Rejection;

/// Errors that can occur while fetching one PDF.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        url: String,
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// File system error while writing the temp file or promoting it.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was verified but its success could not be recorded.
    #[error("could not record verified download of {url}: {source}")]
    Unrecorded {
        url: String,
        #[source]
        source: StateError,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The provided URL is malformed or not http(s).
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The response was received but failed content verification.
    #[error("verification failed for {url}: {reason}")]
    Rejected {
        url: String,
        reason: Rejection,
        /// Status of the rejected response.
        status: u16,
        /// Raw content type of the rejected response.
        content_type: Option<String>,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an error for a verified file whose success was not recorded.
    pub fn unrecorded(url: impl Into<String>, source: StateError) -> Self {
        Self::Unrecorded {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a verification rejection.
    pub fn rejected(
        url: impl Into<String>,
        reason: Rejection,
        status: u16,
        content_type: Option<String>,
    ) -> Self {
        Self::Rejected {
            url: url.into(),
            reason,
            status,
            content_type,
        }
    }

    /// HTTP status associated with this error, if a response was received.
    #[must_use]
    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Content type of the response, when one was received and recorded.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Rejected { content_type, .. } => content_type.as_deref(),
            _ => None,
        }
    }
}
