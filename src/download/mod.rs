//! Verified, resumable PDF downloads.
//!
//! # Features
//!
//! - Streaming downloads into `<final>.part`, hashed while streaming
//! - Content verification before promotion to the canonical filename
//! - Retry with exponential backoff and `Retry-After` support
//! - Per-URL state in the [`StateStore`](crate::StateStore), so repeated runs
//!   never fetch a verified URL twice
//! - Bounded concurrency across distinct URLs with a shared stop flag

mod client;
mod constants;
mod engine;
mod error;
pub mod filename;
mod retry;

pub use client::{ClientOptions, HttpClient, response_meta, stream_to_file};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY,
    REQUEST_TIMEOUT_SECS, TEMP_SUFFIX,
};
pub use engine::{DownloadEngine, DownloadOutcome, DownloadStats, EngineError};
pub use error::DownloadError;
pub use filename::canonical_filename;
pub use retry::{
    DEFAULT_BACKOFF_BASE, DEFAULT_MAX_DELAY, DEFAULT_MAX_JITTER, DEFAULT_MAX_RETRIES, FailureType,
    MAX_BACKOFF_BASE, RetryDecision, RetryPolicy, classify_error, classify_http_status,
    parse_retry_after,
};
