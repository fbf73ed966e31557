//! Persistent per-URL download state.
//!
//! The state store is the single source of truth for resumability: every PDF
//! URL gets at most one row recording its attempts, the last response seen and
//! its final status (pending → success | failed).
//!
//! # Example
//!
//! ```ignore
//! use harvester_core::{Database, StateStore};
//!
//! let store = StateStore::new(Database::new_in_memory().await?);
//! if !store.is_success("https://example.com/law.pdf").await? {
//!     // ... download it ...
//! }
//! ```

mod error;
mod record;

pub use error::StateError;
pub use record::{DownloadRecord, DownloadStatus, RecordUpdate, VerifiedFileInfo};

use tracing::{debug, instrument};

use crate::db::Database;

/// Longest failure detail kept in the store.
const MAX_ERROR_CHARS: usize = 2000;

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StateError>;

fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_CHARS).collect()
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// SQLite-backed store of [`DownloadRecord`]s keyed by URL.
///
/// Writes for different URLs may run concurrently. Writes for one URL are
/// serialized by the download engine, which never runs two attempts for the
/// same URL at once.
#[derive(Debug, Clone)]
pub struct StateStore {
    db: Database,
}

impl StateStore {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Fetches the record for `url`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get(&self, url: &str) -> Result<Option<DownloadRecord>> {
        let record = sqlx::query_as::<_, DownloadRecord>("SELECT * FROM downloads WHERE url = ?")
            .bind(url)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(record)
    }

    /// Returns true when `url` has been verified and promoted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn is_success(&self, url: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM downloads WHERE url = ? AND status = 'success'")
                .bind(url)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.is_some())
    }

    /// Creates the record on first write, otherwise merges the given fields and
    /// increments the attempt count.
    ///
    /// A record already in `success` keeps that status whatever `update` says.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the write fails.
    #[instrument(skip(self, update))]
    pub async fn upsert(&self, url: &str, update: &RecordUpdate) -> Result<DownloadRecord> {
        let record = sqlx::query_as::<_, DownloadRecord>(
            r"INSERT INTO downloads (
                url, status, last_status, content_type, sha256, filename, size_bytes,
                last_error, attempts
              )
              VALUES (?1, COALESCE(?2, 'pending'), ?3, ?4, ?5, ?6, ?7, ?8, 1)
              ON CONFLICT(url) DO UPDATE SET
                attempts = downloads.attempts + 1,
                status = CASE
                    WHEN downloads.status = 'success' THEN 'success'
                    ELSE COALESCE(?2, downloads.status)
                END,
                last_status = COALESCE(?3, downloads.last_status),
                content_type = COALESCE(?4, downloads.content_type),
                sha256 = COALESCE(?5, downloads.sha256),
                filename = COALESCE(?6, downloads.filename),
                size_bytes = COALESCE(?7, downloads.size_bytes),
                last_error = COALESCE(?8, downloads.last_error),
                updated_at = datetime('now')
              RETURNING *",
        )
        .bind(url)
        .bind(update.status.map(|status| status.as_str()))
        .bind(update.last_status.map(i64::from))
        .bind(update.content_type.as_deref())
        .bind(update.sha256.as_deref())
        .bind(update.filename.as_deref())
        .bind(update.size_bytes.map(to_db_int))
        .bind(update.last_error.as_deref().map(truncate_error))
        .fetch_one(self.db.pool())
        .await?;

        debug!(attempts = record.attempts, status = %record.status(), "record upserted");
        Ok(record)
    }

    /// Records the start of a new attempt: status `pending`, attempts + 1.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the write fails.
    pub async fn begin_attempt(&self, url: &str) -> Result<DownloadRecord> {
        self.upsert(url, &RecordUpdate::pending()).await
    }

    /// Records a verified, promoted file. Clears any previous error.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the write fails.
    #[instrument(skip(self, info), fields(filename = %info.filename))]
    pub async fn mark_success(&self, url: &str, info: &VerifiedFileInfo) -> Result<()> {
        sqlx::query(
            r"INSERT INTO downloads (
                url, filename, size_bytes, sha256, content_type, last_status, status, attempts
              )
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'success', 1)
              ON CONFLICT(url) DO UPDATE SET
                filename = excluded.filename,
                size_bytes = excluded.size_bytes,
                sha256 = excluded.sha256,
                content_type = excluded.content_type,
                last_status = excluded.last_status,
                status = 'success',
                last_error = NULL,
                updated_at = datetime('now')",
        )
        .bind(url)
        .bind(&info.filename)
        .bind(to_db_int(info.size_bytes))
        .bind(&info.sha256)
        .bind(&info.content_type)
        .bind(i64::from(info.http_status))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Records a terminal failure. Never downgrades a `success` record.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the write fails.
    #[instrument(skip(self), fields(error = %error))]
    pub async fn mark_failed(
        &self,
        url: &str,
        error: &str,
        http_status: Option<u16>,
        content_type: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"INSERT INTO downloads (url, status, last_error, last_status, content_type, attempts)
              VALUES (?1, 'failed', ?2, ?3, ?4, 1)
              ON CONFLICT(url) DO UPDATE SET
                status = CASE WHEN downloads.status = 'success' THEN 'success' ELSE 'failed' END,
                last_error = excluded.last_error,
                last_status = COALESCE(excluded.last_status, downloads.last_status),
                content_type = COALESCE(excluded.content_type, downloads.content_type),
                updated_at = datetime('now')",
        )
        .bind(url)
        .bind(truncate_error(error))
        .bind(http_status.map(i64::from))
        .bind(content_type)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Notes a retryable failure on the current attempt without ending it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the write fails.
    #[instrument(skip(self), fields(error = %error))]
    pub async fn note_transient_failure(
        &self,
        url: &str,
        error: &str,
        http_status: Option<u16>,
    ) -> Result<()> {
        sqlx::query(
            r"UPDATE downloads
              SET last_error = ?,
                  last_status = COALESCE(?, last_status),
                  updated_at = datetime('now')
              WHERE url = ? AND status != 'success'",
        )
        .bind(truncate_error(error))
        .bind(http_status.map(i64::from))
        .bind(url)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Moves a `failed` record back to `pending` so the next run retries it.
    ///
    /// Returns `false` when the record exists but is not `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::RecordNotFound`] if no record exists for `url`,
    /// or [`StateError::Database`] if the write fails.
    #[instrument(skip(self))]
    pub async fn reset(&self, url: &str) -> Result<bool> {
        let result = sqlx::query(
            r"UPDATE downloads
              SET status = 'pending', last_error = NULL, updated_at = datetime('now')
              WHERE url = ? AND status = 'failed'",
        )
        .bind(url)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get(url).await? {
            Some(_) => Ok(false),
            None => Err(StateError::RecordNotFound(url.to_string())),
        }
    }

    /// Moves every `failed` record back to `pending`. Returns how many moved.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the write fails.
    #[instrument(skip(self))]
    pub async fn reset_failed(&self) -> Result<u64> {
        let result = sqlx::query(
            r"UPDATE downloads
              SET status = 'pending', last_error = NULL, updated_at = datetime('now')
              WHERE status = 'failed'",
        )
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Counts records in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    pub async fn count_by_status(&self, status: DownloadStatus) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM downloads WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Lists records in `status`, ordered by URL.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    pub async fn list_by_status(&self, status: DownloadStatus) -> Result<Vec<DownloadRecord>> {
        let records = sqlx::query_as::<_, DownloadRecord>(
            "SELECT * FROM downloads WHERE status = ? ORDER BY url",
        )
        .bind(status.as_str())
        .fetch_all(self.db.pool())
        .await?;
        Ok(records)
    }

    /// Total number of records.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Database`] if the query fails.
    pub async fn count_all(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM downloads")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}
