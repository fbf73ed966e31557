//! Best-effort dismissal of cookie banners and overlay dialogs.

use tracing::{debug, trace};

use super::driver::{BrowserDriver, ElementSnapshot};

/// Buttons clicked whenever they are visible.
const DISMISS_SELECTORS: &[&str] = &[
    "button#onetrust-accept-btn-handler",
    "button[aria-label*='accept' i]",
    "button[aria-label*='close' i]",
];

/// Button labels (accept, confirm, close) that dismiss the catalog's dialogs.
const DISMISS_LABELS: &[&str] = &["מאשר", "אשר", "קבל", "סגור"];

fn has_dismiss_label(element: &ElementSnapshot) -> bool {
    DISMISS_LABELS
        .iter()
        .any(|label| element.text.contains(label))
}

/// Clicks visible dismiss buttons on the current page. Returns how many were
/// clicked; every failure is swallowed.
pub async fn dismiss_popups(driver: &mut dyn BrowserDriver) -> usize {
    let mut clicked = 0;

    for selector in DISMISS_SELECTORS {
        let Ok(buttons) = driver.query_all(selector).await else {
            continue;
        };
        for button in buttons.iter().filter(|b| b.visible) {
            if driver.click(button).await.is_ok() {
                trace!(selector, "dismissed overlay");
                clicked += 1;
            }
        }
    }

    if let Ok(buttons) = driver.query_all("button").await {
        for button in buttons
            .iter()
            .filter(|b| b.visible && has_dismiss_label(b))
        {
            if driver.click(button).await.is_ok() {
                trace!(label = %button.text, "dismissed overlay");
                clicked += 1;
            }
        }
    }

    if clicked > 0 {
        debug!(clicked, "dismissed popups");
    }
    clicked
}
