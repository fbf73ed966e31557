//! Anchor extraction by URL pattern.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::driver::BrowserDriver;

/// Default document-item pattern on the catalog.
pub const DEFAULT_ITEM_PATTERN: &str = r"(?i)lawitemid=";

/// Default PDF pattern: `.pdf` at the end of the path, before a query or fragment.
pub const DEFAULT_PDF_PATTERN: &str = r"(?i)\.pdf(?:$|[?#])";

#[allow(clippy::expect_used)]
static ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_ITEM_PATTERN).expect("item regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static PDF_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_PDF_PATTERN).expect("PDF regex is valid") // Static pattern, safe to panic
});

/// A compiled href pattern.
#[derive(Debug, Clone)]
pub struct LinkPattern {
    regex: Regex,
}

impl LinkPattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// Returns the regex error if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }

    #[must_use]
    pub fn document_items() -> Self {
        Self {
            regex: ITEM_REGEX.clone(),
        }
    }

    #[must_use]
    pub fn pdfs() -> Self {
        Self {
            regex: PDF_REGEX.clone(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    #[must_use]
    pub fn matches(&self, href: &str) -> bool {
        self.regex.is_match(href)
    }
}

/// Keeps hrefs matching `pattern`, in order, without repeats.
#[must_use]
pub fn filter_links<I>(hrefs: I, pattern: &LinkPattern) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    hrefs
        .into_iter()
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty() && pattern.matches(href))
        .filter(|href| seen.insert(href.clone()))
        .collect()
}

/// Resolved hrefs on the current page matching `pattern`, in document order.
///
/// A page whose anchors cannot be read yields no links.
pub async fn extract_links(driver: &mut dyn BrowserDriver, pattern: &LinkPattern) -> Vec<String> {
    match driver.query_all("a[href]").await {
        Ok(anchors) => filter_links(anchors.into_iter().filter_map(|a| a.href), pattern),
        Err(e) => {
            debug!(error = %e, "could not read anchors");
            Vec::new()
        }
    }
}
