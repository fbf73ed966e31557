//! Content verification for downloaded PDFs.
//!
//! A response is accepted only when every check passes:
//! 1. the HTTP status is 2xx
//! 2. the normalized content type is allow-listed
//! 3. the body is at least the configured minimum size
//! 4. the body starts with the `%PDF-` signature
//!
//! Checks run in that order and the first violation is reported.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};

/// Magic bytes every PDF starts with.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Default minimum body size in bytes.
pub const DEFAULT_MIN_BYTES: u64 = 2048;

/// Content types accepted when none are configured.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf", "application/octet-stream"];

/// Lowercases the media type and strips parameters (`; charset=...`).
#[must_use]
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Verification thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Normalized media types that are accepted.
    pub allowed_content_types: BTreeSet<String>,
    /// Smallest acceptable body.
    pub min_bytes: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|value| (*value).to_string())
                .collect(),
            min_bytes: DEFAULT_MIN_BYTES,
        }
    }
}

impl VerifierConfig {
    /// Builds a config from raw content types, normalizing each one.
    ///
    /// Empty entries are dropped.
    #[must_use]
    pub fn new<I, S>(allowed_content_types: I, min_bytes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|value| normalize_content_type(value.as_ref()))
                .filter(|value| !value.is_empty())
                .collect(),
            min_bytes,
        }
    }
}

/// Response metadata observed before the body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub status: u16,
    pub content_type: Option<String>,
}

impl ResponseMeta {
    /// Normalized content type, if the response carried one.
    #[must_use]
    pub fn normalized_content_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .map(normalize_content_type)
            .filter(|value| !value.is_empty())
    }
}

/// Why a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Status outside 2xx.
    BadStatus(u16),
    /// Content type missing or not allow-listed.
    DisallowedContentType(Option<String>),
    /// Body shorter than the minimum.
    TooSmall { size: u64, min: u64 },
    /// Body does not start with `%PDF-`.
    MissingSignature,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadStatus(status) => write!(f, "unexpected HTTP status {status}"),
            Self::DisallowedContentType(Some(content_type)) => {
                write!(f, "content type {content_type} is not allowed")
            }
            Self::DisallowedContentType(None) => write!(f, "response has no content type"),
            Self::TooSmall { size, min } => {
                write!(f, "body is {size} bytes, minimum is {min}")
            }
            Self::MissingSignature => write!(f, "body does not start with %PDF-"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Incremental SHA-256 over a streamed body.
///
/// Keeps the first few bytes so the signature can be checked afterwards
/// without buffering the whole file.
#[derive(Clone, Default)]
pub struct BodyDigest {
    hasher: Sha256,
    head: Vec<u8>,
    len: u64,
}

impl fmt::Debug for BodyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyDigest")
            .field("len", &self.len)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

impl BodyDigest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk.
    pub fn update(&mut self, chunk: &[u8]) {
        if self.head.len() < PDF_SIGNATURE.len() {
            let wanted = PDF_SIGNATURE.len() - self.head.len();
            self.head.extend_from_slice(&chunk[..wanted.min(chunk.len())]);
        }
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    /// Bytes seen so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finishes hashing.
    #[must_use]
    pub fn finish(self) -> BodySummary {
        BodySummary {
            sha256: format!("{:x}", self.hasher.finalize()),
            size: self.len,
            starts_with_signature: self.head.starts_with(PDF_SIGNATURE),
        }
    }
}

/// Result of hashing a complete body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodySummary {
    /// Lowercase hex SHA-256.
    pub sha256: String,
    pub size: u64,
    pub starts_with_signature: bool,
}

/// Accepted content with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub sha256: String,
    pub size: u64,
    /// Normalized content type.
    pub content_type: String,
}

/// Pure accept/reject decision over response metadata and body.
#[derive(Debug, Clone, Default)]
pub struct ContentVerifier {
    config: VerifierConfig,
}

impl ContentVerifier {
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Checks status and content type only.
    ///
    /// Lets the engine reject a response before streaming its body.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] found.
    pub fn check_meta(&self, meta: &ResponseMeta) -> Result<String, Rejection> {
        if !(200..300).contains(&meta.status) {
            return Err(Rejection::BadStatus(meta.status));
        }
        match meta.normalized_content_type() {
            Some(content_type) if self.config.allowed_content_types.contains(&content_type) => {
                Ok(content_type)
            }
            other => Err(Rejection::DisallowedContentType(other)),
        }
    }

    /// Full verification over metadata and a hashed body.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] found.
    pub fn verify(&self, meta: &ResponseMeta, body: &BodySummary) -> Result<Verified, Rejection> {
        let content_type = self.check_meta(meta)?;
        if body.size < self.config.min_bytes {
            return Err(Rejection::TooSmall {
                size: body.size,
                min: self.config.min_bytes,
            });
        }
        if !body.starts_with_signature {
            return Err(Rejection::MissingSignature);
        }
        Ok(Verified {
            sha256: body.sha256.clone(),
            size: body.size,
            content_type,
        })
    }

    /// Verifies a complete in-memory body.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] found.
    pub fn verify_bytes(&self, meta: &ResponseMeta, body: &[u8]) -> Result<Verified, Rejection> {
        let mut digest = BodyDigest::new();
        digest.update(body);
        self.verify(meta, &digest.finish())
    }
}
