//! Flat URL manifests handed from the crawl to later stages.
//!
//! Each crawl writes a pair of timestamped files: document pages in discovery
//! order and PDF links sorted. Later stages read the newest pair, where "newest"
//! is simply the last filename in lexical order.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::crawl::CrawlManifest;

/// `chrono` format of the manifest timestamp.
pub const MANIFEST_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
/// Filename prefix of document page manifests.
pub const PAGES_PREFIX: &str = "scraped_urls_";
/// Filename prefix of PDF link manifests.
pub const PDFS_PREFIX: &str = "pdf_links_";
const MANIFEST_EXTENSION: &str = ".txt";

/// Errors reading or writing manifests.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No manifest with the prefix exists in the directory.
    #[error("no {prefix}*{MANIFEST_EXTENSION} manifest in {dir}")]
    NotFound { dir: PathBuf, prefix: &'static str },
}

impl ManifestError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Paths of one written manifest pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub pages: PathBuf,
    pub pdfs: PathBuf,
}

/// Manifest filename for `prefix` at `timestamp`.
#[must_use]
pub fn manifest_filename(prefix: &str, timestamp: &DateTime<Local>) -> String {
    format!(
        "{prefix}{}{MANIFEST_EXTENSION}",
        timestamp.format(MANIFEST_TIMESTAMP_FORMAT)
    )
}

/// Writes one URL per line, atomically: temp file, fsync, rename.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] if the file cannot be written or renamed.
pub fn write_url_list(path: &Path, urls: &[String]) -> Result<(), ManifestError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let write = || -> std::io::Result<()> {
        let file = std::fs::File::create(&temp)?;
        let mut writer = std::io::BufWriter::new(file);
        for url in urls {
            writeln!(writer, "{url}")?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = std::fs::remove_file(&temp);
        return Err(ManifestError::io(&temp, e));
    }
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        ManifestError::io(path, e)
    })
}

/// Reads a URL list, skipping blank lines and `#` comments.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] if the file cannot be read.
pub fn read_url_list(path: &Path) -> Result<Vec<String>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Writes the crawl's page and PDF manifests into `dir`.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] if the directory or either file cannot be
/// written.
pub fn write_manifests(
    dir: &Path,
    manifest: &CrawlManifest,
    timestamp: &DateTime<Local>,
) -> Result<ManifestPaths, ManifestError> {
    std::fs::create_dir_all(dir).map_err(|e| ManifestError::io(dir, e))?;
    let paths = ManifestPaths {
        pages: dir.join(manifest_filename(PAGES_PREFIX, timestamp)),
        pdfs: dir.join(manifest_filename(PDFS_PREFIX, timestamp)),
    };
    write_url_list(&paths.pages, &manifest.page_urls())?;
    write_url_list(&paths.pdfs, &manifest.pdf_urls())?;
    info!(
        pages = %paths.pages.display(),
        pdfs = %paths.pdfs.display(),
        "manifests written"
    );
    Ok(paths)
}

/// Newest manifest with `prefix` in `dir`, by filename order.
///
/// # Errors
///
/// Returns [`ManifestError::NotFound`] if there is none, or
/// [`ManifestError::Io`] if `dir` cannot be listed.
pub fn latest_manifest(dir: &Path, prefix: &'static str) -> Result<PathBuf, ManifestError> {
    let not_found = || ManifestError::NotFound {
        dir: dir.to_path_buf(),
        prefix,
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(ManifestError::io(dir, e)),
    };

    let latest = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(prefix) && name.ends_with(MANIFEST_EXTENSION))
        .max()
        .ok_or_else(not_found)?;
    debug!(manifest = %latest, "latest manifest");
    Ok(dir.join(latest))
}
