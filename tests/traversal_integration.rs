//! Integration tests for the crawl traversal against a scripted browser.

use std::time::Duration;

use async_trait::async_trait;
use harvester_core::crawl::{
    BrowserDriver, CrawlConfig, CrawlTraversal, DriverError, ElementSnapshot, NavigationTiming,
    StopReason,
};
use serde_json::Value;

mod support;
use support::fake_browser::{FakeElement, FakeEvent, FakeSite};

const LIST: &str = "https://catalog.test/laws";

/// Delays each click's postback the way a real browser does: the next
/// `failed_reads` reads error out, then the old page keeps rendering for
/// `stale_reads` more reads before the click lands.
struct PostbackLag {
    site: FakeSite,
    failed_reads: usize,
    stale_reads: usize,
    pending: Option<ElementSnapshot>,
    failures_left: usize,
    stale_left: usize,
}

impl PostbackLag {
    fn new(site: FakeSite, failed_reads: usize, stale_reads: usize) -> Self {
        Self {
            site,
            failed_reads,
            stale_reads,
            pending: None,
            failures_left: 0,
            stale_left: 0,
        }
    }

    async fn before_read(&mut self) -> Result<(), DriverError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(DriverError::Script(
                "Execution context was destroyed".to_string(),
            ));
        }
        if self.stale_left > 0 {
            self.stale_left -= 1;
        } else if let Some(element) = self.pending.take() {
            self.site.click(&element).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for PostbackLag {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.site.navigate(url).await
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, DriverError> {
        self.before_read().await?;
        self.site.evaluate(script).await
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementSnapshot>, DriverError> {
        self.before_read().await?;
        self.site.query_all(selector).await
    }

    async fn click(&mut self, element: &ElementSnapshot) -> Result<(), DriverError> {
        self.pending = Some(element.clone());
        self.failures_left = self.failed_reads;
        self.stale_left = self.stale_reads;
        Ok(())
    }
}

fn config() -> CrawlConfig {
    let mut config = CrawlConfig::new(LIST);
    config.timing = NavigationTiming::immediate(Duration::from_millis(50));
    config
}

fn doc(id: u32) -> String {
    format!("https://catalog.test/law?lawitemid={id}")
}

fn pdf(name: &str) -> String {
    format!("https://files.test/{name}.pdf")
}

fn doc_links(ids: &[u32]) -> Vec<FakeElement> {
    ids.iter().map(|id| FakeElement::link(doc(*id))).collect()
}

/// Listing of `pages` postback pages; page i links documents `ids[i]`.
fn listing(site: &mut FakeSite, pages: &[&[u32]], last_next: FakeElement) {
    let first = site.add_page(LIST, Vec::new());
    let mut states = vec![first];
    for _ in 1..pages.len() {
        states.push(site.add_state(LIST, Vec::new()));
    }
    for (i, ids) in pages.iter().enumerate() {
        let mut elements = doc_links(ids);
        elements.push(FakeElement::link("https://catalog.test/about"));
        if i + 1 < pages.len() {
            elements.push(FakeElement::next(Some(states[i + 1])));
        } else {
            elements.push(last_next.clone());
        }
        site.set_elements(states[i], elements);
    }
}

#[tokio::test]
async fn test_listing_stops_on_disabled_next_after_n_pages() {
    let mut site = FakeSite::new();
    listing(&mut site, &[&[1, 2, 3], &[4, 2], &[5]], FakeElement::disabled_next());
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages(LIST, 0)
        .await;

    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.stop, StopReason::NoNextControl);
    let urls = report.urls();
    assert_eq!(urls, vec![doc(1), doc(2), doc(3), doc(4), doc(5)]);
    assert_eq!(report.pages[3].order, 3);
}

#[tokio::test]
async fn test_listing_noop_next_visits_exactly_n_pages() {
    let mut site = FakeSite::new();
    listing(&mut site, &[&[1], &[2]], FakeElement::next(None));
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages(LIST, 0)
        .await;

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.stop, StopReason::NavigationTimedOut);
    assert_eq!(report.urls(), vec![doc(1), doc(2)]);
}

#[tokio::test]
async fn test_listing_cycle_stops_at_loop_guard() {
    let mut site = FakeSite::new();
    let a = site.add_page(LIST, Vec::new());
    let b = site.add_state(LIST, Vec::new());
    let c = site.add_state(LIST, Vec::new());
    let mut page_a = doc_links(&[1]);
    page_a.push(FakeElement::next(Some(b)));
    let mut page_b = doc_links(&[2]);
    page_b.push(FakeElement::next(Some(c)));
    let mut page_c = doc_links(&[3]);
    page_c.push(FakeElement::next(Some(a)));
    site.set_elements(a, page_a);
    site.set_elements(b, page_b);
    site.set_elements(c, page_c);
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages(LIST, 0)
        .await;

    assert_eq!(report.stop, StopReason::LoopGuard);
    assert_eq!(report.pages_visited, 3);
    assert_eq!(report.urls(), vec![doc(1), doc(2), doc(3)]);
}

#[tokio::test]
async fn test_listing_page_limit() {
    let mut site = FakeSite::new();
    listing(&mut site, &[&[1], &[2], &[3]], FakeElement::disabled_next());
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages(LIST, 2)
        .await;

    assert_eq!(report.stop, StopReason::PageLimit);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.urls(), vec![doc(1), doc(2)]);
}

#[tokio::test]
async fn test_listing_entry_failure_is_reported() {
    let mut site = FakeSite::new();
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages("https://catalog.test/missing", 0)
        .await;

    assert_eq!(report.stop, StopReason::EntryFailed);
    assert_eq!(report.pages_visited, 0);
    assert!(report.pages.is_empty());
}

#[tokio::test]
async fn test_listing_without_grid_ids_uses_next_like_postback() {
    let mut site = FakeSite::new();
    let first = site.add_page(LIST, Vec::new());
    let second = site.add_state(LIST, doc_links(&[2]));
    let mut elements = doc_links(&[1]);
    elements.push(FakeElement::postback("1", Some(first)));
    elements.push(FakeElement::postback("הבא", Some(second)));
    site.set_elements(first, elements);
    let events = site.events();
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages(LIST, 0)
        .await;

    assert_eq!(report.urls(), vec![doc(1), doc(2)]);
    assert_eq!(report.stop, StopReason::NoNextControl);
    let events = events.lock().unwrap();
    assert!(events.contains(&FakeEvent::Click {
        state: first,
        text: "הבא".to_string(),
    }));
}

#[tokio::test]
async fn test_entry_dismisses_popups() {
    let mut site = FakeSite::new();
    let mut elements = doc_links(&[1]);
    elements.push(FakeElement::button("סגור"));
    elements.push(FakeElement::button("חיפוש"));
    let page = site.add_page(LIST, elements);
    let events = site.events();
    let config = config();

    CrawlTraversal::new(&mut site, &config)
        .collect_listing_pages(LIST, 1)
        .await;

    let events = events.lock().unwrap();
    let clicks: Vec<&FakeEvent> = events
        .iter()
        .filter(|e| matches!(e, FakeEvent::Click { .. }))
        .collect();
    assert_eq!(
        clicks,
        vec![&FakeEvent::Click {
            state: page,
            text: "סגור".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_pdf_links_follow_nested_pagination() {
    let mut site = FakeSite::new();
    let first = site.add_page(&doc(1), Vec::new());
    let second = site.add_state(doc(1), vec![
        FakeElement::link(pdf("c")),
        FakeElement::link(format!("{}?v=2", pdf("d"))),
        FakeElement::link("https://files.test/readme.doc"),
        FakeElement::disabled_next(),
    ]);
    site.set_elements(first, vec![
        FakeElement::link(pdf("a")),
        FakeElement::link(pdf("b")),
        FakeElement::link(pdf("a")),
        FakeElement::next(Some(second)),
    ]);
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_pdf_links(&doc(1), 0)
        .await;

    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.stop, StopReason::NoNextControl);
    assert_eq!(
        report.pdf_links,
        vec![pdf("a"), pdf("b"), pdf("c"), format!("{}?v=2", pdf("d"))]
    );
}

#[tokio::test]
async fn test_pdf_links_stop_when_page_adds_nothing_new() {
    let mut site = FakeSite::new();
    let first = site.add_page(&doc(1), Vec::new());
    let second = site.add_state(doc(1), vec![
        FakeElement::link(pdf("a")),
        FakeElement::link("https://catalog.test/other"),
        FakeElement::next(Some(first)),
    ]);
    site.set_elements(first, vec![
        FakeElement::link(pdf("a")),
        FakeElement::next(Some(second)),
    ]);
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_pdf_links(&doc(1), 0)
        .await;

    assert_eq!(report.stop, StopReason::NoNewLinks);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.pdf_links, vec![pdf("a")]);
}

#[tokio::test]
async fn test_pdf_links_respect_page_limit() {
    let mut site = FakeSite::new();
    let first = site.add_page(&doc(1), Vec::new());
    let second = site.add_state(doc(1), vec![FakeElement::link(pdf("b"))]);
    site.set_elements(first, vec![
        FakeElement::link(pdf("a")),
        FakeElement::next(Some(second)),
    ]);
    let config = config();

    let report = CrawlTraversal::new(&mut site, &config)
        .collect_pdf_links(&doc(1), 1)
        .await;

    assert_eq!(report.stop, StopReason::PageLimit);
    assert_eq!(report.pdf_links, vec![pdf("a")]);
}

#[tokio::test]
async fn test_collect_all_dedups_pdfs_first_owner_wins() {
    let mut site = FakeSite::new();
    listing(&mut site, &[&[1, 2, 3]], FakeElement::disabled_next());
    site.add_page(&doc(1), vec![FakeElement::link(pdf("shared")), FakeElement::link(pdf("one"))]);
    site.add_page(&doc(2), vec![FakeElement::link(pdf("two")), FakeElement::link(pdf("shared"))]);
    let config = config();

    let manifest = CrawlTraversal::new(&mut site, &config).collect_all().await;

    assert_eq!(manifest.page_urls(), vec![doc(1), doc(2), doc(3)]);
    assert_eq!(manifest.pdf_urls(), vec![pdf("one"), pdf("shared"), pdf("two")]);
    let shared = manifest
        .pdf_links
        .iter()
        .find(|link| link.url == pdf("shared"))
        .unwrap();
    assert_eq!(shared.source_page, doc(1));
    assert_eq!(manifest.documents[2].stop, StopReason::EntryFailed);
}

#[tokio::test]
async fn test_listing_survives_unreadable_page_during_postback() {
    let mut site = FakeSite::new();
    listing(&mut site, &[&[1], &[2]], FakeElement::disabled_next());
    let mut driver = PostbackLag::new(site, 1, 4);
    let config = config();

    let report = CrawlTraversal::new(&mut driver, &config)
        .collect_listing_pages(LIST, 0)
        .await;

    assert_eq!(report.urls(), vec![doc(1), doc(2)]);
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.stop, StopReason::NoNextControl);
}

#[tokio::test]
async fn test_unreadable_same_page_rerender_times_out() {
    let mut site = FakeSite::new();
    listing(&mut site, &[&[1]], FakeElement::next(None));
    let mut driver = PostbackLag::new(site, 2, 0);
    let config = config();

    let report = CrawlTraversal::new(&mut driver, &config)
        .collect_listing_pages(LIST, 0)
        .await;

    assert_eq!(report.stop, StopReason::NavigationTimedOut);
    assert_eq!(report.pages_visited, 1);
}

#[tokio::test]
async fn test_pdf_links_survive_unreadable_page_during_postback() {
    let mut site = FakeSite::new();
    let first = site.add_page(&doc(1), Vec::new());
    let second = site.add_state(doc(1), vec![FakeElement::link(pdf("b"))]);
    site.set_elements(first, vec![
        FakeElement::link(pdf("a")),
        FakeElement::next(Some(second)),
    ]);
    let mut driver = PostbackLag::new(site, 3, 2);
    let config = config();

    let report = CrawlTraversal::new(&mut driver, &config)
        .collect_pdf_links(&doc(1), 0)
        .await;

    assert_eq!(report.pdf_links, vec![pdf("a"), pdf("b")]);
    assert_eq!(report.stop, StopReason::NoNextControl);
}
