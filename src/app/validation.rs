//! Startup validation: CLI/env values to typed library configs.
//!
//! Everything here runs before any file or database is touched, so a bad
//! configuration exits without side effects.

use std::path::PathBuf;
use std::time::Duration;

use harvester_core::crawl::{BrowserOptions, CrawlConfig, NavigationTiming};
use harvester_core::download::{ClientOptions, MAX_BACKOFF_BASE, RetryPolicy};
use harvester_core::pipeline::{CommandTemplate, ExternalStage};
use harvester_core::user_agent::resolve_user_agent;
use harvester_core::verify::VerifierConfig;
use url::Url;

use crate::cli::{Args, Stage};

/// Configuration problems that stop the run at startup.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("START_URL is empty")]
    MissingStartUrl,

    #[error("START_URL {url:?} is not an http(s) URL")]
    InvalidStartUrl { url: String },

    #[error("CHROME_BINARY {path} does not exist")]
    MissingBrowserBinary { path: PathBuf },

    #[error("WEBDRIVER_URL {url:?} is not an http(s) URL")]
    InvalidWebDriverUrl { url: String },

    #[error("ALLOW_CONTENT_TYPES lists no content types")]
    NoContentTypes,

    #[error("RETRY_BACKOFF_BASE must be a number between 1 and {MAX_BACKOFF_BASE}, got {0}")]
    InvalidBackoffBase(f32),

    #[error("RETRY_MAX_SLEEP must be a non-negative number of seconds, got {0}")]
    InvalidMaxSleep(f64),
}

/// Everything a run needs, validated.
#[derive(Debug)]
pub(crate) struct RunConfig {
    pub(crate) stage: Stage,
    pub(crate) crawl: CrawlConfig,
    pub(crate) browser: BrowserOptions,
    pub(crate) client: ClientOptions,
    pub(crate) verifier: VerifierConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) concurrency: usize,
    pub(crate) retry_failed: bool,
    pub(crate) reset_urls: Vec<String>,
    pub(crate) download_dir: PathBuf,
    pub(crate) state_db: PathBuf,
    pub(crate) manifest_dir: PathBuf,
    pub(crate) ocr: ExternalStage,
    pub(crate) postproc: ExternalStage,
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl RunConfig {
    /// Validates `args`. Browser settings are only checked when the stage
    /// crawls.
    pub(crate) fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let crawls = args.stage.includes(Stage::Scrape);

        let start_url = args.start_url.trim().to_string();
        let webdriver_url = non_blank(args.webdriver_url.as_ref()).map(str::to_string);
        if crawls {
            if start_url.is_empty() {
                return Err(ConfigError::MissingStartUrl);
            }
            if !is_http_url(&start_url) {
                return Err(ConfigError::InvalidStartUrl { url: start_url });
            }
            if let Some(path) = &args.chrome_binary
                && !path.exists()
            {
                return Err(ConfigError::MissingBrowserBinary { path: path.clone() });
            }
            if let Some(url) = &webdriver_url
                && !is_http_url(url)
            {
                return Err(ConfigError::InvalidWebDriverUrl { url: url.clone() });
            }
        }

        let verifier = VerifierConfig::new(&args.allow_content_types, args.pdf_min_bytes);
        if verifier.allowed_content_types.is_empty() {
            return Err(ConfigError::NoContentTypes);
        }
        if !(1.0..=MAX_BACKOFF_BASE).contains(&args.retry_backoff_base) {
            return Err(ConfigError::InvalidBackoffBase(args.retry_backoff_base));
        }
        let max_sleep = Duration::try_from_secs_f64(args.retry_max_sleep)
            .map_err(|_| ConfigError::InvalidMaxSleep(args.retry_max_sleep))?;

        let user_agent = resolve_user_agent(args.user_agent.as_deref());

        let mut crawl = CrawlConfig::new(start_url);
        crawl.max_listing_pages = args.max_listing_pages;
        crawl.max_document_pages = args.max_law_pages;
        crawl.timing = NavigationTiming {
            wait_timeout: Duration::from_secs(args.wait_timeout),
            ..NavigationTiming::default()
        };

        let browser = BrowserOptions {
            chrome_binary: args.chrome_binary.clone(),
            headless: args.headless,
            user_agent: user_agent.clone(),
            page_load_timeout: Duration::from_secs(args.pageload_timeout),
            webdriver_url,
        };

        let client = ClientOptions {
            request_timeout: Duration::from_secs(args.request_timeout),
            user_agent,
            ..ClientOptions::default()
        };

        let retry =
            RetryPolicy::from_backoff_base(args.max_retries, args.retry_backoff_base, max_sleep);

        Ok(Self {
            stage: args.stage,
            crawl,
            browser,
            client,
            verifier,
            retry,
            concurrency: usize::from(args.concurrency),
            retry_failed: args.retry_failed,
            reset_urls: args.reset_urls.clone(),
            download_dir: args.download_dir.clone(),
            state_db: args.state_db.clone(),
            manifest_dir: args.manifest_dir.clone(),
            ocr: ExternalStage {
                name: "ocr",
                command: non_blank(args.ocr_command.as_ref()).and_then(CommandTemplate::parse),
                input_dir: args.download_dir.clone(),
                input_extension: "pdf",
                output_dir: args.ocr_text_dir.clone(),
                output_extension: "txt",
            },
            postproc: ExternalStage {
                name: "postproc",
                command: non_blank(args.postproc_command.as_ref()).and_then(CommandTemplate::parse),
                input_dir: args.ocr_text_dir.clone(),
                input_extension: "txt",
                output_dir: args.postproc_text_dir.clone(),
                output_extension: "txt",
            },
        })
    }
}
