//! Harvester Core Library
//!
//! Crawls a postback-paginated legislation catalog with a real browser,
//! downloads every linked PDF with content verification, and records each
//! URL's progress durably so interrupted or repeated runs pick up where they
//! left off.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`state`] - Per-URL download records (the resumability source of truth)
//! - [`verify`] - Pure content verification and hashing
//! - [`download`] - Streaming download engine with retry and promotion
//! - [`crawl`] - Browser driver capability and two-level pagination
//! - [`pipeline`] - Manifests, backend selection and external stages

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crawl;
pub mod db;
pub mod download;
pub mod pipeline;
pub mod state;
pub mod user_agent;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use crawl::{
    BrowserDriver, BrowserOptions, CrawlConfig, CrawlManifest, CrawlTraversal, DriverError,
    StopReason,
};
pub use db::Database;
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadEngine, DownloadOutcome, DownloadStats,
    EngineError, FailureType, HttpClient, RetryDecision, RetryPolicy, classify_error,
};
pub use pipeline::{ManifestError, PipelineError};
pub use state::{DownloadRecord, DownloadStatus, StateError, StateStore};
pub use verify::{ContentVerifier, Rejection, VerifierConfig};
