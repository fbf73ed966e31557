//! Browser-driven discovery of document pages and their PDF links.
//!
//! # Features
//!
//! - One [`BrowserDriver`] capability with a DevTools backend and a WebDriver
//!   fallback
//! - Listing and nested file pagination driven by "next" controls
//! - Page-signature loop guard and typed stop reasons
//! - Global PDF deduplication, first owner wins

mod chromium;
mod driver;
mod links;
mod model;
mod navigation;
mod next;
mod popups;
mod signature;
mod traversal;
mod webdriver;

pub use chromium::ChromiumDriver;
pub use driver::{
    BrowserDriver, BrowserOptions, DriverError, ElementSnapshot, LOCATION_SCRIPT,
    READY_STATE_SCRIPT, REF_ATTRIBUTE, parse_snapshots, snapshot_script,
};
pub use links::{
    DEFAULT_ITEM_PATTERN, DEFAULT_PDF_PATTERN, LinkPattern, extract_links, filter_links,
};
pub use model::{
    CrawlManifest, DiscoveredPage, DocumentReport, ListingReport, PdfLink, StopReason,
};
pub use navigation::{
    Advance, DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_DELAY, DEFAULT_WAIT_TIMEOUT, NavigationTiming,
    advance, read_signature, wait_ready,
};
pub use next::{
    NextControl, NextMatcher, PaginationSelectors, find_next_control, looks_like_next,
};
pub use popups::dismiss_popups;
pub use signature::{PageSignature, SIGNATURE_SAMPLE, page_signature};
pub use traversal::{CrawlConfig, CrawlTraversal};
pub use webdriver::{ELEMENT_KEY, WebDriverSession};
