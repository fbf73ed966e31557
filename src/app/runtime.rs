//! Stage orchestration for one process run.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use harvester_core::crawl::BrowserDriver;
use harvester_core::download::HttpClient;
use harvester_core::pipeline::{StageReport, open_browser, run_download, run_scrape};
use harvester_core::{
    ContentVerifier, Database, DownloadEngine, DownloadStats, StateError, StateStore,
};
use tracing::{info, warn};

use crate::app::exit_handler::{ProcessExit, determine_exit_outcome};
use crate::app::progress_manager::spawn_progress_ui;
use crate::app::validation::RunConfig;
use crate::cli::Stage;

/// Counts that decide the exit code.
#[derive(Debug, Default)]
struct RunTally {
    succeeded: usize,
    failed: usize,
    interrupted: usize,
}

impl RunTally {
    fn add_stage(&mut self, report: &StageReport) {
        self.succeeded += report.processed;
        self.failed += report.failed;
        self.interrupted += report.interrupted;
    }

    fn add_downloads(&mut self, stats: &DownloadStats) {
        self.succeeded += stats.completed() + stats.skipped();
        self.failed += stats.failed();
        self.interrupted += stats.interrupted();
    }
}

async fn scrape(config: &RunConfig) -> Result<()> {
    let (mut driver, backend) = open_browser(&config.browser)
        .await
        .context("could not start a browser session")?;
    info!(?backend, "browser session ready");

    let result = run_scrape(driver.as_mut(), &config.crawl, &config.manifest_dir).await;
    if let Err(e) = driver.close().await {
        warn!(error = %e, "browser session did not close cleanly");
    }
    let (manifest, paths) = result?;

    info!(
        documents = manifest.listing.pages.len(),
        listing_stop = %manifest.listing.stop,
        pdfs = manifest.pdf_links.len(),
        manifest = %paths.pdfs.display(),
        "scrape complete"
    );
    for report in manifest.documents.iter().filter(|r| !r.stop.is_clean()) {
        warn!(page = %report.page_url, stop = %report.stop, "document crawl ended early");
    }
    Ok(())
}

async fn reset_requested(store: &StateStore, urls: &[String]) -> Result<()> {
    for url in urls {
        match store.reset(url).await {
            Ok(true) => info!(%url, "reset to pending"),
            Ok(false) => info!(%url, "not failed, left as is"),
            Err(StateError::RecordNotFound(_)) => warn!(%url, "no record to reset"),
            Err(e) => return Err(e).context("could not reset download record"),
        }
    }
    Ok(())
}

async fn download(
    config: &RunConfig,
    stop: Arc<AtomicBool>,
    use_spinner: bool,
) -> Result<Arc<DownloadStats>> {
    let db = Database::new(&config.state_db)
        .await
        .with_context(|| format!("could not open state database {}", config.state_db.display()))?;
    let store = StateStore::new(db);
    reset_requested(&store, &config.reset_urls).await?;

    let client = HttpClient::new(&config.client)?;
    let engine = DownloadEngine::new(
        client,
        store.clone(),
        ContentVerifier::new(config.verifier.clone()),
        config.retry.clone(),
        config.download_dir.clone(),
        config.concurrency,
    )?
    .with_retry_failed(config.retry_failed);

    let stats = Arc::new(DownloadStats::new());
    let (spinner, spinner_stop) = spawn_progress_ui(use_spinner, Arc::clone(&stats));
    let result = run_download(&engine, &config.manifest_dir, stop, Arc::clone(&stats)).await;
    spinner_stop.store(true, std::sync::atomic::Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }
    result?;

    info!(
        completed = stats.completed(),
        skipped = stats.skipped(),
        failed = stats.failed(),
        retried = stats.retried(),
        interrupted = stats.interrupted(),
        "download complete"
    );
    store.database().clone().close().await;
    Ok(stats)
}

/// Runs the configured stages in order and returns the exit outcome.
///
/// # Errors
///
/// Fails when a stage cannot start: no browser, no manifest, or an unusable
/// state database. Per-item failures only affect the exit outcome.
pub(crate) async fn run(
    config: RunConfig,
    stop: Arc<AtomicBool>,
    use_spinner: bool,
) -> Result<ProcessExit> {
    let mut tally = RunTally::default();
    let stopped = || stop.load(std::sync::atomic::Ordering::SeqCst);

    if config.stage.includes(Stage::Scrape) {
        scrape(&config).await?;
    }
    if config.stage.includes(Stage::Download) && !stopped() {
        let stats = download(&config, Arc::clone(&stop), use_spinner).await?;
        tally.add_downloads(&stats);
    }
    if config.stage.includes(Stage::Ocr) && !stopped() {
        let report = config.ocr.run(&stop).await?;
        tally.add_stage(&report);
    }
    if config.stage.includes(Stage::Postproc) && !stopped() {
        let report = config.postproc.run(&stop).await?;
        tally.add_stage(&report);
    }
    if stopped() {
        warn!("stopped on request; rerun to resume");
        tally.interrupted = tally.interrupted.max(1);
    }

    Ok(determine_exit_outcome(
        tally.succeeded,
        tally.failed,
        tally.interrupted,
    ))
}
