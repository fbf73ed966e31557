//! Stage sequencing: crawl to manifests, manifests to downloads, downloads to
//! text.

mod manifest;
mod stages;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::Local;
use tracing::{info, instrument, warn};

use crate::crawl::{
    BrowserDriver, BrowserOptions, ChromiumDriver, CrawlConfig, CrawlManifest, CrawlTraversal,
    DriverError, WebDriverSession,
};
use crate::download::{DownloadEngine, DownloadStats, EngineError};

pub use manifest::{
    MANIFEST_TIMESTAMP_FORMAT, ManifestError, ManifestPaths, PAGES_PREFIX, PDFS_PREFIX,
    latest_manifest, manifest_filename, read_url_list, write_manifests, write_url_list,
};
pub use stages::{
    CommandTemplate, ExternalStage, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER, StageReport,
};

/// Errors that end a stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which browser backend a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Chromium,
    WebDriver,
}

/// Starts one browser session: DevTools first, then the WebDriver endpoint if
/// one is configured and Chrome could not be launched.
///
/// # Errors
///
/// Returns the launch error of the last backend tried.
#[instrument(skip(options))]
pub async fn open_browser(
    options: &BrowserOptions,
) -> Result<(Box<dyn BrowserDriver>, Backend), DriverError> {
    match ChromiumDriver::launch(options).await {
        Ok(driver) => Ok((Box::new(driver), Backend::Chromium)),
        Err(e) if options.webdriver_url.is_some() => {
            warn!(error = %e, "devtools launch failed, using webdriver endpoint");
            let session = WebDriverSession::connect(options).await?;
            Ok((Box::new(session), Backend::WebDriver))
        }
        Err(e) => Err(e),
    }
}

/// Crawls the catalog and writes the manifest pair into `manifest_dir`.
///
/// # Errors
///
/// Returns [`PipelineError::Manifest`] if the manifests cannot be written.
/// Crawl problems never fail the stage; they show up as stop reasons.
#[instrument(skip(driver, config), fields(start_url = %config.start_url))]
pub async fn run_scrape(
    driver: &mut dyn BrowserDriver,
    config: &CrawlConfig,
    manifest_dir: &Path,
) -> Result<(CrawlManifest, ManifestPaths), PipelineError> {
    let manifest = CrawlTraversal::new(driver, config).collect_all().await;
    let paths = write_manifests(manifest_dir, &manifest, &Local::now())?;
    Ok((manifest, paths))
}

/// PDF URLs from the newest manifest in `manifest_dir`.
///
/// # Errors
///
/// Returns [`PipelineError::Manifest`] if there is no manifest or it cannot be
/// read.
pub fn latest_pdf_urls(manifest_dir: &Path) -> Result<(PathBuf, Vec<String>), PipelineError> {
    let path = latest_manifest(manifest_dir, PDFS_PREFIX)?;
    let urls = read_url_list(&path)?;
    Ok((path, urls))
}

/// Downloads every URL in the newest PDF manifest, updating `stats` as it goes.
///
/// # Errors
///
/// Returns [`PipelineError::Manifest`] if no manifest can be read and
/// [`PipelineError::Engine`] if the batch cannot start.
#[instrument(skip(engine, stop, stats))]
pub async fn run_download(
    engine: &DownloadEngine,
    manifest_dir: &Path,
    stop: Arc<AtomicBool>,
    stats: Arc<DownloadStats>,
) -> Result<(), PipelineError> {
    let (path, urls) = latest_pdf_urls(manifest_dir)?;
    info!(manifest = %path.display(), urls = urls.len(), "downloading from manifest");
    engine.download_all_into(urls, stop, stats).await?;
    Ok(())
}
