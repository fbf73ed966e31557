//! Constants for the download module (timeouts, temp files, concurrency).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (60 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Suffix of the temporary file a body is streamed into before promotion.
pub const TEMP_SUFFIX: &str = ".part";

/// Default number of URLs downloaded at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Minimum allowed concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency.
pub const MAX_CONCURRENCY: usize = 32;
