//! "Next page" control selection.
//!
//! Postback grids give no reliable last-page signal, so the control to click is
//! chosen by an ordered list of matchers. The first matcher that finds an
//! actionable element wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::driver::{BrowserDriver, ElementSnapshot};

/// CSS selectors for the "next" controls of one pagination level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSelectors {
    /// Grid-specific control with a stable id.
    pub primary: String,
    /// Broader fallback id pattern.
    pub secondary: String,
    /// Any control that triggers a postback.
    pub postback: String,
}

impl PaginationSelectors {
    /// Selectors for the catalog's listing grid.
    #[must_use]
    pub fn listing() -> Self {
        Self {
            primary: "a[id*='aNextPage']".to_string(),
            secondary: "a[id*='lnkbtnNext']".to_string(),
            postback: "a[href*='__doPostBack']".to_string(),
        }
    }

    /// Selectors for the file grid nested in a document page.
    #[must_use]
    pub fn document() -> Self {
        Self {
            primary: ".RadGrid a[id*='aNextPage'], [id*='rg'] a[id*='aNextPage'], .rgPageNext"
                .to_string(),
            secondary: "a[id*='aNextPage'], a[id*='lnkbtnNext']".to_string(),
            postback: "a[href*='__doPostBack']".to_string(),
        }
    }
}

impl Default for PaginationSelectors {
    fn default() -> Self {
        Self::listing()
    }
}

/// Which matcher found the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextMatcher {
    Primary,
    Secondary,
    NextLikePostback,
    AnyPostback,
}

/// Result of looking for a "next" control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextControl {
    /// An actionable control to click.
    Found {
        element: ElementSnapshot,
        matcher: NextMatcher,
    },
    /// The grid's own "next" control is rendered but disabled: last page.
    Exhausted,
    /// Nothing on the page looks like a "next" control.
    Missing,
}

/// Text or label of a "next" control: English, Hebrew, or arrows.
const NEXT_TEXT_PATTERN: &str = r"(?i)(\bnext\b|הבא|»|›|^\s*>{1,2}\s*$)";

#[allow(clippy::expect_used)]
static NEXT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(NEXT_TEXT_PATTERN)
        .expect("next-text regex is valid") // Static pattern, safe to panic
});

/// True when the element's label, id or class reads as "next".
#[must_use]
pub fn looks_like_next(element: &ElementSnapshot) -> bool {
    if NEXT_TEXT.is_match(&element.text) || NEXT_TEXT.is_match(&element.aria_label) {
        return true;
    }
    let id = element.id.to_ascii_lowercase();
    let class = element.class_name.to_ascii_lowercase();
    id.contains("next") || class.contains("next")
}

async fn query(driver: &mut dyn BrowserDriver, selector: &str) -> Vec<ElementSnapshot> {
    if selector.trim().is_empty() {
        return Vec::new();
    }
    driver.query_all(selector).await.unwrap_or_default()
}

/// Picks the control to click on the current page.
pub async fn find_next_control(
    driver: &mut dyn BrowserDriver,
    selectors: &PaginationSelectors,
) -> NextControl {
    let mut saw_disabled_grid_control = false;

    for (selector, matcher) in [
        (&selectors.primary, NextMatcher::Primary),
        (&selectors.secondary, NextMatcher::Secondary),
    ] {
        let candidates = query(driver, selector).await;
        if let Some(element) = candidates.iter().find(|e| e.is_actionable()) {
            trace!(?matcher, id = %element.id, "next control found");
            return NextControl::Found {
                element: element.clone(),
                matcher,
            };
        }
        saw_disabled_grid_control |= candidates.iter().any(|e| e.visible && e.looks_disabled());
    }

    if saw_disabled_grid_control {
        return NextControl::Exhausted;
    }

    let postbacks = query(driver, &selectors.postback).await;
    if let Some(element) = postbacks
        .iter()
        .find(|e| e.is_actionable() && looks_like_next(e))
    {
        return NextControl::Found {
            element: element.clone(),
            matcher: NextMatcher::NextLikePostback,
        };
    }
    if let Some(element) = postbacks.iter().find(|e| e.is_actionable()) {
        return NextControl::Found {
            element: element.clone(),
            matcher: NextMatcher::AnyPostback,
        };
    }
    NextControl::Missing
}
