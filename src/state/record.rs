//! Download record types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Final status of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// An attempt is underway or was interrupted before finishing.
    Pending,
    /// The file was verified and promoted. Terminal.
    Success,
    /// Verification failed or retries were exhausted.
    Failed,
}

impl DownloadStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// Persistent per-URL download state.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRecord {
    /// Source PDF URL (primary key).
    pub url: String,
    /// Saved filename, set once verified.
    pub filename: Option<String>,
    /// Size of the verified file.
    pub size_bytes: Option<i64>,
    /// Hex SHA-256 of the verified file.
    pub sha256: Option<String>,
    /// Last content type observed.
    pub content_type: Option<String>,
    /// Last HTTP status observed.
    pub last_status: Option<i64>,
    /// Final status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Number of download attempts made across all runs.
    pub attempts: i64,
    /// Last failure detail.
    pub last_error: Option<String>,
    /// When the record was created.
    pub created_at: String,
    /// When the record was last updated.
    pub updated_at: String,
}

impl DownloadRecord {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Pending` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.status_str.parse().unwrap_or(DownloadStatus::Pending)
    }

    /// True once the file has been verified and promoted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == DownloadStatus::Success
    }
}

impl fmt::Display for DownloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadRecord {{ url: {}, status: {}, attempts: {} }}",
            self.url,
            self.status(),
            self.attempts
        )
    }
}

/// Field values merged into a record by [`super::StateStore::upsert`].
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<DownloadStatus>,
    pub last_status: Option<u16>,
    pub content_type: Option<String>,
    pub sha256: Option<String>,
    pub filename: Option<String>,
    pub size_bytes: Option<u64>,
    pub last_error: Option<String>,
}

impl RecordUpdate {
    /// Update that only moves the record to `pending`.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: Some(DownloadStatus::Pending),
            ..Self::default()
        }
    }
}

/// Metadata of a verified, promoted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedFileInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub content_type: String,
    pub http_status: u16,
}
