//! Error types for state store operations.

use thiserror::Error;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// Database operation failed.
    #[error("state database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No record exists for the URL.
    #[error("no download record for {0}; the URL has never been attempted")]
    RecordNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_error_wraps_sqlx() {
        let err = StateError::from(sqlx::Error::PoolClosed);
        assert!(matches!(err, StateError::Database(sqlx::Error::PoolClosed)));
        assert!(err.to_string().starts_with("state database error"));
    }

    #[test]
    fn test_record_not_found_names_url() {
        let err = StateError::RecordNotFound("https://example.com/a.pdf".to_string());
        assert!(err.to_string().contains("https://example.com/a.pdf"));
    }
}
