//! Two-level pagination over the catalog.
//!
//! The listing grid yields document pages; each document page carries its own
//! paginated file grid yielding PDFs. Neither grid says when it is on its last
//! page, so both loops stop on one of the [`StopReason`]s: a repeated page
//! signature, a page bound, a missing or dead "next" control, or (for files) a
//! page that adds nothing new.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, instrument, warn};

use super::driver::BrowserDriver;
use super::links::{LinkPattern, extract_links};
use super::model::{
    CrawlManifest, DiscoveredPage, DocumentReport, ListingReport, PdfLink, StopReason,
};
use super::navigation::{Advance, NavigationTiming, advance, read_signature, wait_ready};
use super::next::PaginationSelectors;
use super::popups::dismiss_popups;
use super::signature::PageSignature;

/// Crawl settings. Page bounds of 0 mean unbounded.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_url: String,
    pub max_listing_pages: usize,
    pub max_document_pages: usize,
    pub item_pattern: LinkPattern,
    pub pdf_pattern: LinkPattern,
    pub listing_selectors: PaginationSelectors,
    pub document_selectors: PaginationSelectors,
    pub timing: NavigationTiming,
    pub dismiss_popups: bool,
}

impl CrawlConfig {
    /// Catalog defaults for `start_url`.
    #[must_use]
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            max_listing_pages: 0,
            max_document_pages: 0,
            item_pattern: LinkPattern::document_items(),
            pdf_pattern: LinkPattern::pdfs(),
            listing_selectors: PaginationSelectors::listing(),
            document_selectors: PaginationSelectors::document(),
            timing: NavigationTiming::default(),
            dismiss_popups: true,
        }
    }
}

fn limit_reached(visited: usize, max_pages: usize) -> bool {
    max_pages > 0 && visited >= max_pages
}

fn stop_after(advance: &Advance) -> Option<StopReason> {
    match advance {
        Advance::Moved(_) => None,
        Advance::NoControl => Some(StopReason::NoNextControl),
        Advance::TimedOut => Some(StopReason::NavigationTimedOut),
    }
}

/// Drives one browser session through the catalog.
///
/// Seen signatures and accumulators live only for the duration of one call.
pub struct CrawlTraversal<'a> {
    driver: &'a mut dyn BrowserDriver,
    config: &'a CrawlConfig,
}

impl<'a> CrawlTraversal<'a> {
    pub fn new(driver: &'a mut dyn BrowserDriver, config: &'a CrawlConfig) -> Self {
        Self { driver, config }
    }

    /// Loads `url`, waits for it to be ready, and clears overlays.
    async fn enter(&mut self, url: &str) -> bool {
        if let Err(e) = self.driver.navigate(url).await {
            warn!(url, error = %e, "could not open page");
            return false;
        }
        wait_ready(self.driver, &self.config.timing).await;
        if self.config.dismiss_popups {
            dismiss_popups(self.driver).await;
        }
        true
    }

    /// Paginates the listing from `start_url`, collecting document page URLs
    /// in discovery order.
    #[instrument(skip(self))]
    pub async fn collect_listing_pages(
        &mut self,
        start_url: &str,
        max_pages: usize,
    ) -> ListingReport {
        let mut pages: Vec<DiscoveredPage> = Vec::new();
        let mut known: HashSet<String> = HashSet::new();
        let mut seen: HashSet<PageSignature> = HashSet::new();
        let mut visited = 0;

        if !self.enter(start_url).await {
            return ListingReport {
                pages,
                pages_visited: 0,
                stop: StopReason::EntryFailed,
            };
        }

        let Some(mut signature) = read_signature(self.driver, &self.config.timing).await else {
            warn!(url = start_url, "listing page never became readable");
            return ListingReport {
                pages,
                pages_visited: 0,
                stop: StopReason::EntryFailed,
            };
        };
        let stop = loop {
            if !seen.insert(signature.clone()) {
                break StopReason::LoopGuard;
            }

            let links = extract_links(self.driver, &self.config.item_pattern).await;
            let before = pages.len();
            for url in links {
                if known.insert(url.clone()) {
                    pages.push(DiscoveredPage {
                        order: pages.len(),
                        url,
                    });
                }
            }
            visited += 1;
            debug!(page = visited, %signature, new = pages.len() - before, "listing page");

            if limit_reached(visited, max_pages) {
                break StopReason::PageLimit;
            }
            let step = advance(
                self.driver,
                &self.config.listing_selectors,
                &signature,
                &self.config.timing,
            )
            .await;
            if let Some(stop) = stop_after(&step) {
                break stop;
            }
            if let Advance::Moved(next) = step {
                signature = next;
            }
        };

        info!(documents = pages.len(), pages = visited, %stop, "listing done");
        ListingReport {
            pages,
            pages_visited: visited,
            stop,
        }
    }

    /// Paginates one document page's file grid, collecting PDF URLs.
    #[instrument(skip(self))]
    pub async fn collect_pdf_links(
        &mut self,
        page_url: &str,
        max_pages: usize,
    ) -> DocumentReport {
        let mut links: Vec<String> = Vec::new();
        let mut known: HashSet<String> = HashSet::new();
        let mut seen: HashSet<PageSignature> = HashSet::new();
        let mut visited = 0;

        if !self.enter(page_url).await {
            return DocumentReport {
                page_url: page_url.to_string(),
                pdf_links: links,
                pages_visited: 0,
                stop: StopReason::EntryFailed,
            };
        }

        let Some(mut signature) = read_signature(self.driver, &self.config.timing).await else {
            warn!(url = page_url, "document page never became readable");
            return DocumentReport {
                page_url: page_url.to_string(),
                pdf_links: links,
                pages_visited: 0,
                stop: StopReason::EntryFailed,
            };
        };
        let stop = loop {
            if !seen.insert(signature.clone()) {
                break StopReason::LoopGuard;
            }

            let found = extract_links(self.driver, &self.config.pdf_pattern).await;
            let mut added = 0;
            for url in found {
                if known.insert(url.clone()) {
                    links.push(url);
                    added += 1;
                }
            }
            visited += 1;
            debug!(page = visited, %signature, added, "document page");

            if added == 0 {
                break StopReason::NoNewLinks;
            }
            if limit_reached(visited, max_pages) {
                break StopReason::PageLimit;
            }
            let step = advance(
                self.driver,
                &self.config.document_selectors,
                &signature,
                &self.config.timing,
            )
            .await;
            if let Some(stop) = stop_after(&step) {
                break stop;
            }
            if let Advance::Moved(next) = step {
                signature = next;
            }
        };

        debug!(pdfs = links.len(), pages = visited, %stop, "document done");
        DocumentReport {
            page_url: page_url.to_string(),
            pdf_links: links,
            pages_visited: visited,
            stop,
        }
    }

    /// Full crawl: listing first, then every document page in discovery order.
    ///
    /// PDF links are deduplicated across documents; the first document to
    /// link a PDF owns it.
    #[instrument(skip(self), fields(start_url = %self.config.start_url))]
    pub async fn collect_all(&mut self) -> CrawlManifest {
        let config = self.config;
        let listing = self
            .collect_listing_pages(&config.start_url, config.max_listing_pages)
            .await;

        let mut owners: BTreeMap<String, String> = BTreeMap::new();
        let mut documents = Vec::with_capacity(listing.pages.len());
        for page in &listing.pages {
            let report = self
                .collect_pdf_links(&page.url, config.max_document_pages)
                .await;
            for url in &report.pdf_links {
                owners
                    .entry(url.clone())
                    .or_insert_with(|| page.url.clone());
            }
            documents.push(report);
        }

        let pdf_links: Vec<PdfLink> = owners
            .into_iter()
            .map(|(url, source_page)| PdfLink { url, source_page })
            .collect();
        info!(
            documents = listing.pages.len(),
            pdfs = pdf_links.len(),
            "crawl done"
        );
        CrawlManifest {
            listing,
            documents,
            pdf_links,
        }
    }
}
