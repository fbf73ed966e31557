//! Download engine: fetch, verify, promote and record one PDF per URL.
//!
//! Each URL runs through an explicit attempt state machine:
//!
//! ```text
//! Pending -> InFlight -> Verified -> (promoted, success recorded)
//!               |  ^
//!               v  |
//!            RetryWait        InFlight -> Failed (failure recorded)
//! ```
//!
//! Bodies are streamed to `<final>.part` and only renamed to the canonical name
//! after verification passes, so a file under its final name is always a
//! verified PDF. Batches run distinct URLs concurrently behind a semaphore and
//! stop cleanly when the shared stop flag is raised.
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::download::{ClientOptions, DownloadEngine, HttpClient, RetryPolicy};
//! use harvester_core::verify::{ContentVerifier, VerifierConfig};
//! use harvester_core::{Database, StateStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = StateStore::new(Database::new_in_memory().await?);
//! let engine = DownloadEngine::new(
//!     HttpClient::new(&ClientOptions::default())?,
//!     store,
//!     ContentVerifier::new(VerifierConfig::default()),
//!     RetryPolicy::default(),
//!     PathBuf::from("./pdfs"),
//!     4,
//! )?;
//! let urls = vec!["https://example.com/law.pdf".to_string()];
//! let stats = engine.download_all(urls, Arc::new(AtomicBool::new(false))).await?;
//! println!("completed: {}, failed: {}", stats.completed(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::client::{response_meta, stream_to_file};
use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::filename::target_paths;
use super::retry::{RetryDecision, RetryPolicy, classify_error, retry_after_hint};
use super::{DownloadError, HttpClient};
use crate::state::{DownloadStatus, StateStore, VerifiedFileInfo};
use crate::verify::{ContentVerifier, Verified};

/// Granularity of stop-flag checks while sleeping between attempts.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error type for download engine operations.
///
/// Individual download failures are never reported here; they are recorded in
/// the state store and returned as [`DownloadOutcome::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The download directory could not be created.
    #[error("cannot create download directory {path}: {source}")]
    DownloadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Result of running one URL through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched, verified and promoted in this run.
    Downloaded {
        path: PathBuf,
        sha256: String,
        size: u64,
        attempts: u32,
    },
    /// The state store already recorded success; no request was made.
    AlreadyVerified { path: PathBuf },
    /// A previous run recorded a terminal failure and retrying is disabled.
    SkippedFailed,
    /// Verification failed or retries were exhausted.
    Failed { reason: String, attempts: u32 },
    /// The stop flag was raised before the URL finished.
    Interrupted { attempts: u32 },
}

impl DownloadOutcome {
    /// True for `Downloaded` and `AlreadyVerified`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Downloaded { .. } | Self::AlreadyVerified { .. })
    }

    fn attempts(&self) -> u32 {
        match self {
            Self::Downloaded { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::Interrupted { attempts } => *attempts,
            Self::AlreadyVerified { .. } | Self::SkippedFailed => 0,
        }
    }
}

/// Statistics from a download batch run.
///
/// Uses atomic counters so concurrent download tasks can update them.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
    interrupted: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs downloaded and verified in this run.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// URLs skipped because they were already verified or previously failed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// URLs that failed in this run.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Retry attempts made across all URLs.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// URLs left unfinished because of the stop flag.
    #[must_use]
    pub fn interrupted(&self) -> usize {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Total URLs accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.skipped() + self.failed() + self.interrupted()
    }

    /// Folds one outcome into the counters.
    pub fn record(&self, outcome: &DownloadOutcome) {
        let counter = match outcome {
            DownloadOutcome::Downloaded { .. } => &self.completed,
            DownloadOutcome::AlreadyVerified { .. } | DownloadOutcome::SkippedFailed => {
                &self.skipped
            }
            DownloadOutcome::Failed { .. } => &self.failed,
            DownloadOutcome::Interrupted { .. } => &self.interrupted,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        let retries = outcome.attempts().saturating_sub(1) as usize;
        self.retried.fetch_add(retries, Ordering::SeqCst);
    }
}

/// Per-URL attempt state.
#[derive(Debug)]
enum AttemptState {
    Pending,
    InFlight { attempt: u32 },
    RetryWait { attempt: u32, delay: Duration },
    Verified { attempt: u32, file: Verified, temp_path: PathBuf, http_status: u16 },
    Failed { attempt: u32, error: DownloadError },
}

/// Download engine for verified, resumable PDF downloads.
///
/// Cheap to clone; clones share the HTTP connection pool, the state store and
/// the concurrency semaphore.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    client: HttpClient,
    store: StateStore,
    verifier: ContentVerifier,
    retry_policy: RetryPolicy,
    download_dir: PathBuf,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_failed: bool,
}

impl DownloadEngine {
    /// Creates a new download engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is outside
    /// the valid range.
    #[instrument(level = "debug", skip(client, store, verifier, retry_policy))]
    pub fn new(
        client: HttpClient,
        store: StateStore,
        verifier: ContentVerifier,
        retry_policy: RetryPolicy,
        download_dir: PathBuf,
        concurrency: usize,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            min_bytes = verifier.config().min_bytes,
            "creating download engine"
        );

        Ok(Self {
            client,
            store,
            verifier,
            retry_policy,
            download_dir,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_failed: false,
        })
    }

    /// Allows URLs whose records are `failed` to be attempted again.
    #[must_use]
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Downloads every distinct URL in `urls`, up to the concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DownloadDir`] if the download directory cannot be
    /// created and [`EngineError::SemaphoreClosed`] if the semaphore closes.
    /// Per-URL failures are counted in the stats, not returned.
    pub async fn download_all<I>(
        &self,
        urls: I,
        stop: Arc<AtomicBool>,
    ) -> Result<DownloadStats, EngineError>
    where
        I: IntoIterator<Item = String>,
    {
        let stats = Arc::new(DownloadStats::new());
        self.download_all_into(urls, stop, Arc::clone(&stats)).await?;
        Ok(Arc::try_unwrap(stats).unwrap_or_else(|shared| {
            let copy = DownloadStats::new();
            copy.completed.store(shared.completed(), Ordering::SeqCst);
            copy.skipped.store(shared.skipped(), Ordering::SeqCst);
            copy.failed.store(shared.failed(), Ordering::SeqCst);
            copy.retried.store(shared.retried(), Ordering::SeqCst);
            copy.interrupted.store(shared.interrupted(), Ordering::SeqCst);
            copy
        }))
    }

    /// Like [`download_all`](Self::download_all) but updates caller-owned stats,
    /// so progress can be observed while the batch runs.
    ///
    /// # Errors
    ///
    /// See [`download_all`](Self::download_all).
    #[instrument(skip(self, urls, stop, stats), fields(dir = %self.download_dir.display()))]
    pub async fn download_all_into<I>(
        &self,
        urls: I,
        stop: Arc<AtomicBool>,
        stats: Arc<DownloadStats>,
    ) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = String>,
    {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|source| EngineError::DownloadDir {
                path: self.download_dir.clone(),
                source,
            })?;

        let mut seen = HashSet::new();
        let mut handles = Vec::new();
        info!(concurrency = self.concurrency, "starting downloads");

        for url in urls {
            if !seen.insert(url.clone()) {
                continue;
            }
            if stop.load(Ordering::SeqCst) {
                stats.record(&DownloadOutcome::Interrupted { attempts: 0 });
                continue;
            }

            let permit = Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let engine = self.clone();
            let stop = Arc::clone(&stop);
            let stats = Arc::clone(&stats);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = engine.download_with_stop(&url, &stop).await;
                stats.record(&outcome);
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
            }
        }

        info!(
            completed = stats.completed(),
            skipped = stats.skipped(),
            failed = stats.failed(),
            retried = stats.retried(),
            interrupted = stats.interrupted(),
            "downloads finished"
        );
        Ok(())
    }

    /// Downloads one URL without a stop flag.
    pub async fn download(&self, url: &str) -> DownloadOutcome {
        self.download_with_stop(url, &AtomicBool::new(false)).await
    }

    /// Downloads one URL, checking `stop` before every attempt and while
    /// waiting between attempts. Never errors: every failure is recorded in
    /// the state store and reported as an outcome.
    #[instrument(skip(self, stop), fields(url = %url))]
    pub async fn download_with_stop(&self, url: &str, stop: &AtomicBool) -> DownloadOutcome {
        let (final_path, temp_path) = target_paths(&self.download_dir, url);

        match self.store.get(url).await {
            Ok(Some(record)) if record.status() == DownloadStatus::Success => {
                if !final_path.exists() {
                    warn!(
                        path = %final_path.display(),
                        "verified file missing from disk; use reset to fetch again"
                    );
                }
                debug!("already verified");
                return DownloadOutcome::AlreadyVerified { path: final_path };
            }
            Ok(Some(record)) if record.status() == DownloadStatus::Failed && !self.retry_failed => {
                debug!(last_error = ?record.last_error, "skipping previously failed URL");
                return DownloadOutcome::SkippedFailed;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "state lookup failed");
                return DownloadOutcome::Failed {
                    reason: e.to_string(),
                    attempts: 0,
                };
            }
        }

        let mut state = AttemptState::Pending;
        loop {
            state = match state {
                AttemptState::Pending => AttemptState::InFlight { attempt: 1 },

                AttemptState::InFlight { attempt } => {
                    if stop.load(Ordering::SeqCst) {
                        info!(attempt, "stop requested before attempt");
                        return DownloadOutcome::Interrupted {
                            attempts: attempt - 1,
                        };
                    }
                    if let Err(e) = self.store.begin_attempt(url).await {
                        warn!(error = %e, "could not record attempt");
                        return DownloadOutcome::Failed {
                            reason: e.to_string(),
                            attempts: attempt - 1,
                        };
                    }
                    debug!(attempt, "attempting download");
                    self.run_attempt(url, attempt, &temp_path).await
                }

                AttemptState::RetryWait { attempt, delay } => {
                    if sleep_unless_stopped(delay, stop).await {
                        info!(attempt, "stop requested while waiting to retry");
                        return DownloadOutcome::Interrupted {
                            attempts: attempt - 1,
                        };
                    }
                    AttemptState::InFlight { attempt }
                }

                AttemptState::Verified {
                    attempt,
                    file,
                    temp_path,
                    http_status,
                } => {
                    return self
                        .promote(url, attempt, file, &temp_path, &final_path, http_status)
                        .await;
                }

                AttemptState::Failed { attempt, error } => {
                    return self.record_failure(url, attempt, &error).await;
                }
            };
        }
    }

    /// Performs one fetch-and-verify and returns the next state.
    async fn run_attempt(&self, url: &str, attempt: u32, temp_path: &Path) -> AttemptState {
        match self.fetch_verified(url, temp_path).await {
            Ok((file, http_status)) => AttemptState::Verified {
                attempt,
                file,
                temp_path: temp_path.to_path_buf(),
                http_status,
            },
            Err(error) => {
                let failure_type = classify_error(&error);
                match self
                    .retry_policy
                    .should_retry(failure_type, attempt, retry_after_hint(&error))
                {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            attempt = next_attempt,
                            max_attempts = self.retry_policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying download"
                        );
                        if let Err(e) = self
                            .store
                            .note_transient_failure(
                                url,
                                &error.to_string(),
                                error.http_status_code(),
                            )
                            .await
                        {
                            warn!(error = %e, "could not record transient failure");
                        }
                        AttemptState::RetryWait {
                            attempt: next_attempt,
                            delay,
                        }
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(%reason, "not retrying download");
                        AttemptState::Failed { attempt, error }
                    }
                }
            }
        }
    }

    /// Streams `url` into `temp_path` and verifies it. Removes the temp file on
    /// any failure.
    async fn fetch_verified(
        &self,
        url: &str,
        temp_path: &Path,
    ) -> Result<(Verified, u16), DownloadError> {
        let response = self.client.get(url).await?;
        let meta = response_meta(&response);

        if let Err(reason) = self.verifier.check_meta(&meta) {
            return Err(DownloadError::rejected(
                url,
                reason,
                meta.status,
                meta.content_type,
            ));
        }

        let body = stream_to_file(response, url, temp_path).await?;
        match self.verifier.verify(&meta, &body) {
            Ok(verified) => Ok((verified, meta.status)),
            Err(reason) => {
                let _ = tokio::fs::remove_file(temp_path).await;
                Err(DownloadError::rejected(
                    url,
                    reason,
                    meta.status,
                    meta.content_type,
                ))
            }
        }
    }

    async fn promote(
        &self,
        url: &str,
        attempt: u32,
        file: Verified,
        temp_path: &Path,
        final_path: &Path,
        http_status: u16,
    ) -> DownloadOutcome {
        if let Err(source) = tokio::fs::rename(temp_path, final_path).await {
            let _ = tokio::fs::remove_file(temp_path).await;
            let error = DownloadError::io(final_path, source);
            return self.record_failure(url, attempt, &error).await;
        }

        let filename = final_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let info = VerifiedFileInfo {
            filename,
            size_bytes: file.size,
            sha256: file.sha256.clone(),
            content_type: file.content_type.clone(),
            http_status,
        };
        if let Err(source) = self.store.mark_success(url, &info).await {
            // A file on disk without a success record would never be re-verified.
            let _ = tokio::fs::remove_file(final_path).await;
            let error = DownloadError::unrecorded(url, source);
            return self.record_failure(url, attempt, &error).await;
        }

        info!(
            path = %final_path.display(),
            bytes = file.size,
            sha256 = %file.sha256,
            attempts = attempt,
            "verified download"
        );
        DownloadOutcome::Downloaded {
            path: final_path.to_path_buf(),
            sha256: file.sha256,
            size: file.size,
            attempts: attempt,
        }
    }

    async fn record_failure(
        &self,
        url: &str,
        attempt: u32,
        error: &DownloadError,
    ) -> DownloadOutcome {
        warn!(error = %error, attempts = attempt, "download failed");
        if let Err(e) = self
            .store
            .mark_failed(
                url,
                &error.to_string(),
                error.http_status_code(),
                error.content_type(),
            )
            .await
        {
            warn!(error = %e, "could not record failure");
        }
        DownloadOutcome::Failed {
            reason: error.to_string(),
            attempts: attempt,
        }
    }
}

/// Sleeps for `delay`, waking early if `stop` is raised. Returns true when
/// stopped.
async fn sleep_unless_stopped(delay: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let step = remaining.min(STOP_POLL_INTERVAL);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    stop.load(Ordering::SeqCst)
}
