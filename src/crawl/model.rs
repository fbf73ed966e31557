//! Crawl results.

use std::fmt;

use serde::Serialize;

/// Why a pagination loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The current page's signature was already visited in this loop.
    LoopGuard,
    /// The configured page bound was reached.
    PageLimit,
    /// No actionable "next" control, or clicking it failed.
    NoNextControl,
    /// "Next" was clicked but the page never changed.
    NavigationTimedOut,
    /// The page added no links the loop had not already collected.
    NoNewLinks,
    /// The loop's entry URL could not be loaded.
    EntryFailed,
}

impl StopReason {
    /// True when the loop ended because pagination is over, rather than on an error.
    #[must_use]
    pub fn is_clean(self) -> bool {
        !matches!(self, Self::EntryFailed | Self::NavigationTimedOut)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LoopGuard => "loop guard",
            Self::PageLimit => "page limit",
            Self::NoNextControl => "no next control",
            Self::NavigationTimedOut => "navigation timed out",
            Self::NoNewLinks => "no new links",
            Self::EntryFailed => "entry page failed",
        };
        f.write_str(label)
    }
}

/// A document page found on the listing, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPage {
    pub url: String,
    /// Zero-based discovery position.
    pub order: usize,
}

/// A PDF URL and the first document page that linked to it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PdfLink {
    pub url: String,
    pub source_page: String,
}

/// Result of paginating the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReport {
    pub pages: Vec<DiscoveredPage>,
    pub pages_visited: usize,
    pub stop: StopReason,
}

impl ListingReport {
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.pages.iter().map(|page| page.url.clone()).collect()
    }
}

/// Result of paginating one document page's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub page_url: String,
    /// PDF URLs in discovery order.
    pub pdf_links: Vec<String>,
    pub pages_visited: usize,
    pub stop: StopReason,
}

/// Everything one full crawl found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlManifest {
    pub listing: ListingReport,
    pub documents: Vec<DocumentReport>,
    /// Globally deduplicated, sorted by URL.
    pub pdf_links: Vec<PdfLink>,
}

impl CrawlManifest {
    /// Document page URLs in discovery order.
    #[must_use]
    pub fn page_urls(&self) -> Vec<String> {
        self.listing.urls()
    }

    /// PDF URLs, sorted.
    #[must_use]
    pub fn pdf_urls(&self) -> Vec<String> {
        self.pdf_links.iter().map(|link| link.url.clone()).collect()
    }
}
