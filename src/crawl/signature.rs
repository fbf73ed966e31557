//! Page fingerprints used to detect real navigation.
//!
//! Postback pagination rarely changes the URL, so "did the page change" is
//! answered by hashing the URL together with the page's anchor targets.

use std::fmt;

use sha2::{Digest, Sha256};

use super::driver::{BrowserDriver, DriverError};

/// Anchors hashed per page, after sorting.
pub const SIGNATURE_SAMPLE: usize = 500;

/// Hex SHA-256 fingerprint of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageSignature(String);

impl PageSignature {
    /// Fingerprint of `url` plus the first [`SIGNATURE_SAMPLE`] sorted hrefs.
    #[must_use]
    pub fn compute<I, S>(url: &str, hrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hrefs: Vec<String> = hrefs
            .into_iter()
            .map(|href| href.as_ref().to_string())
            .filter(|href| !href.is_empty())
            .collect();
        hrefs.sort();

        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        for href in hrefs.iter().take(SIGNATURE_SAMPLE) {
            hasher.update(href.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Fingerprints the driver's current page.
///
/// # Errors
///
/// Returns the driver error if the URL or the anchors cannot be read, which
/// happens while a postback is replacing the document.
pub async fn page_signature(
    driver: &mut dyn BrowserDriver,
) -> Result<PageSignature, DriverError> {
    let url = driver.current_url().await?;
    let hrefs = driver
        .query_all("a[href]")
        .await?
        .into_iter()
        .filter_map(|element| element.href);
    Ok(PageSignature::compute(&url, hrefs))
}
