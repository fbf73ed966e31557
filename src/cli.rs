//! CLI argument definitions using clap derive macros.
//!
//! Every option can also come from the environment (or a `.env` file), using
//! the variable named in its help text.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

use harvester_core::download::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};
use harvester_core::verify::DEFAULT_MIN_BYTES;

/// The catalog's listing of laws in force.
pub const DEFAULT_START_URL: &str =
    "https://main.knesset.gov.il/Activity/Legislation/Laws/Pages/LawLaws.aspx?t=LawLaws&st=LawLawsValidity";

/// Pipeline stage to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Crawl the catalog and write URL manifests
    Scrape,
    /// Download and verify PDFs from the newest manifest
    Download,
    /// Extract text from downloaded PDFs with the OCR command
    Ocr,
    /// Normalize extracted text with the post-processing command
    Postproc,
    /// Every stage in order
    All,
}

impl Stage {
    pub fn includes(self, other: Stage) -> bool {
        self == Stage::All || self == other
    }
}

/// Crawl a postback-paginated legislation catalog and download verified PDFs.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Stage to run
    #[arg(value_enum, default_value_t = Stage::All)]
    pub stage: Stage,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Listing page the crawl starts from
    #[arg(long, env = "START_URL", default_value = DEFAULT_START_URL)]
    pub start_url: String,

    /// Listing pages to visit (0 = no limit)
    #[arg(long, env = "MAX_LISTING_PAGES", default_value_t = 0)]
    pub max_listing_pages: usize,

    /// File pages to visit per document (0 = no limit)
    #[arg(long, env = "MAX_LAW_PAGES", default_value_t = 0)]
    pub max_law_pages: usize,

    /// Chrome/Chromium executable (located automatically when unset)
    #[arg(long, env = "CHROME_BINARY")]
    pub chrome_binary: Option<PathBuf>,

    /// Run the browser without a window; BROWSER_HEADLESS=0 or false shows the window
    #[arg(long, env = "BROWSER_HEADLESS", default_value_t = true, action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub headless: bool,

    /// W3C WebDriver endpoint used when Chrome cannot be launched directly
    #[arg(long, env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Page load timeout in seconds
    #[arg(long, env = "PAGELOAD_TIMEOUT", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub pageload_timeout: u64,

    /// Seconds to wait for a page to change after clicking "next"
    #[arg(long, env = "WAIT_TIMEOUT", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub wait_timeout: u64,

    /// Download attempts per URL, including the first (1-20)
    #[arg(short = 'r', long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Backoff base between 1 and 60: the n-th retry sleeps base^n seconds
    #[arg(long, env = "RETRY_BACKOFF_BASE", default_value_t = 1.5)]
    pub retry_backoff_base: f32,

    /// Longest sleep between attempts, in seconds
    #[arg(long, env = "RETRY_MAX_SLEEP", default_value_t = 30.0)]
    pub retry_max_sleep: f64,

    /// Download request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub request_timeout: u64,

    /// Smallest accepted PDF, in bytes
    #[arg(long, env = "PDF_MIN_BYTES", default_value_t = DEFAULT_MIN_BYTES)]
    pub pdf_min_bytes: u64,

    /// Accepted content types, comma separated
    #[arg(long, env = "ALLOW_CONTENT_TYPES", value_delimiter = ',', default_value = "application/pdf,application/octet-stream")]
    pub allow_content_types: Vec<String>,

    /// Directory for verified PDFs
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "downloaded_pdfs")]
    pub download_dir: PathBuf,

    /// SQLite file holding per-URL download state
    #[arg(long, env = "STATE_DB", default_value = "pipeline_state.db")]
    pub state_db: PathBuf,

    /// Directory for URL manifests
    #[arg(long, env = "MANIFEST_DIR", default_value = "manifests")]
    pub manifest_dir: PathBuf,

    /// Maximum concurrent downloads (1-32)
    #[arg(short = 'c', long, env = "DOWNLOAD_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: u8,

    /// Text extraction command; `{input}` and `{output}` are replaced per file
    #[arg(long, env = "OCR_COMMAND")]
    pub ocr_command: Option<String>,

    /// Directory for extracted text
    #[arg(long, env = "OCR_TEXT_DIR", default_value = "ocr_texts")]
    pub ocr_text_dir: PathBuf,

    /// Post-processing command; `{input}` and `{output}` are replaced per file
    #[arg(long, env = "POSTPROC_COMMAND")]
    pub postproc_command: Option<String>,

    /// Directory for post-processed text
    #[arg(long, env = "POSTPROC_TEXT_DIR", default_value = "postproc_texts")]
    pub postproc_text_dir: PathBuf,

    /// User-Agent for the browser and downloads
    #[arg(long, env = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Attempt URLs that earlier runs recorded as failed
    #[arg(long)]
    pub retry_failed: bool,

    /// Reset a failed URL to pending before downloading (repeatable)
    #[arg(long = "reset-url", value_name = "URL")]
    pub reset_urls: Vec<String>,
}
