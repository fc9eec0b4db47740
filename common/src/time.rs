//! Time utilities and constants for the wallet ledger.

use chrono::{DateTime, Utc};

/// Ledger timing and paging constants.
pub mod constants {
    use std::time::Duration;

    /// Default bound on how long an atomic unit waits for an account lock (5 seconds).
    pub fn default_lock_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Default database connection acquire timeout (3 seconds).
    pub fn default_acquire_timeout() -> Duration {
        Duration::from_secs(3)
    }

    /// Page size used when a caller asks for an out-of-range limit.
    pub const DEFAULT_PAGE_LIMIT: usize = 10;

    /// Largest page size a caller may request.
    pub const MAX_PAGE_LIMIT: usize = 100;
}

/// A timestamp with timezone (always UTC for the ledger).
pub type Timestamp = DateTime<Utc>;

/// Format used when presenting record timestamps to callers.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp in [`DISPLAY_FORMAT`].
pub fn display(timestamp: &Timestamp) -> String {
    timestamp.format(DISPLAY_FORMAT).to_string()
}
