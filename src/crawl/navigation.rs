//! Bounded waits around navigation and "next" clicks.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

use super::driver::{BrowserDriver, READY_STATE_SCRIPT};
use super::next::{NextControl, PaginationSelectors, find_next_control};
use super::signature::{PageSignature, page_signature};

/// Default deadline for a page to change after a click (`WAIT_TIMEOUT`).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default interval between signature polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Default pause after a successful navigation.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Timing for navigation waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTiming {
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for NavigationTiming {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl NavigationTiming {
    /// Zero settle delay and a tight poll; used by tests.
    #[must_use]
    pub fn immediate(wait_timeout: Duration) -> Self {
        Self {
            wait_timeout,
            poll_interval: Duration::from_millis(5),
            settle_delay: Duration::ZERO,
        }
    }
}

/// What happened when "next" was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The page changed; carries the new signature.
    Moved(PageSignature),
    /// No actionable control, the grid's control is disabled, or the click failed.
    NoControl,
    /// A control was clicked but the page did not change in time.
    TimedOut,
}

/// Waits until `document.readyState` is `interactive` or `complete`.
///
/// Returns false on timeout. Script errors count as "not ready yet".
pub async fn wait_ready(driver: &mut dyn BrowserDriver, timing: &NavigationTiming) -> bool {
    let deadline = Instant::now() + timing.wait_timeout;
    loop {
        if let Ok(Value::String(state)) = driver.evaluate(READY_STATE_SCRIPT).await
            && (state == "interactive" || state == "complete")
        {
            return true;
        }
        if Instant::now() >= deadline {
            debug!("page never reported ready");
            return false;
        }
        sleep(timing.poll_interval).await;
    }
}

/// Clicks the next control and waits for the page signature to move off
/// `current`.
///
/// Never fails: every problem degrades to [`Advance::NoControl`] or
/// [`Advance::TimedOut`].
#[instrument(skip_all, fields(from = %current))]
pub async fn advance(
    driver: &mut dyn BrowserDriver,
    selectors: &PaginationSelectors,
    current: &PageSignature,
    timing: &NavigationTiming,
) -> Advance {
    let element = match find_next_control(driver, selectors).await {
        NextControl::Found { element, matcher } => {
            debug!(?matcher, text = %element.text, "clicking next");
            element
        }
        NextControl::Exhausted => {
            debug!("next control disabled");
            return Advance::NoControl;
        }
        NextControl::Missing => {
            debug!("no next control");
            return Advance::NoControl;
        }
    };

    if let Err(e) = driver.click(&element).await {
        warn!(error = %e, "next click failed");
        return Advance::NoControl;
    }

    let deadline = Instant::now() + timing.wait_timeout;
    loop {
        match page_signature(driver).await {
            Ok(signature) if &signature != current => {
                wait_ready(driver, timing).await;
                if !timing.settle_delay.is_zero() {
                    sleep(timing.settle_delay).await;
                }
                match read_signature(driver, timing).await {
                    Some(settled) if &settled != current => return Advance::Moved(settled),
                    Some(_) => debug!("page returned to its previous state"),
                    None => {
                        debug!("page unreadable after navigation");
                        return Advance::TimedOut;
                    }
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "page unreadable while waiting"),
        }
        if Instant::now() >= deadline {
            debug!("page did not change after click");
            return Advance::TimedOut;
        }
        sleep(timing.poll_interval).await;
    }
}

/// Reads the current page signature, polling past transient driver errors.
///
/// Returns `None` if no read succeeds within the wait timeout.
pub async fn read_signature(
    driver: &mut dyn BrowserDriver,
    timing: &NavigationTiming,
) -> Option<PageSignature> {
    let deadline = Instant::now() + timing.wait_timeout;
    loop {
        match page_signature(driver).await {
            Ok(signature) => return Some(signature),
            Err(e) => debug!(error = %e, "page unreadable"),
        }
        if Instant::now() >= deadline {
            return None;
        }
        sleep(timing.poll_interval).await;
    }
}
