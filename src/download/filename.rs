//! Deterministic filenames for verified PDFs.
//!
//! A file's name is derived only from its source URL:
//! `<sanitized basename stem>_<8 hex of sha256(url)>.<ext>`. The same URL always
//! maps to the same name and two URLs sharing a basename never collide.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

use super::constants::TEMP_SUFFIX;

/// Hex characters of the URL hash appended to every name.
const URL_HASH_CHARS: usize = 8;

/// Longest stem kept from the URL basename.
const MAX_STEM_CHARS: usize = 120;

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Short, stable hash of the full URL.
#[must_use]
pub fn url_hash(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..URL_HASH_CHARS].to_string()
}

/// Last path segment of `url`, percent-decoded, without query or fragment.
fn url_basename(url: &str) -> Option<String> {
    let raw = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)?,
        Err(_) => {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            without_query.rsplit('/').next().map(str::to_string)?
        }
    };
    let decoded = urlencoding::decode(&raw).map_or(raw.clone(), |value| value.into_owned());
    (!decoded.is_empty()).then_some(decoded)
}

/// Canonical filename for the PDF at `url`.
#[must_use]
pub fn canonical_filename(url: &str) -> String {
    let hash = url_hash(url);
    let Some(basename) = url_basename(url) else {
        return format!("file_{hash}.pdf");
    };

    let sanitized = sanitize_filename(&basename);
    let sanitized = sanitized.trim_start_matches('.');

    let (stem, ext) = match sanitized.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < sanitized.len() => {
            (&sanitized[..pos], &sanitized[pos + 1..])
        }
        _ => (sanitized, "pdf"),
    };

    if stem.trim_matches(['_', '.', '-']).is_empty() {
        return format!("file_{hash}.{ext}");
    }

    let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
    format!("{stem}_{hash}.{ext}")
}

/// Final and temporary paths for `url` under `dir`.
#[must_use]
pub fn target_paths(dir: &Path, url: &str) -> (PathBuf, PathBuf) {
    let filename = canonical_filename(url);
    let final_path = dir.join(&filename);
    let temp_path = dir.join(format!("{filename}{TEMP_SUFFIX}"));
    (final_path, temp_path)
}
