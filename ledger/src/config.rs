//! Ledger configuration.

use std::time::Duration;

use wallet_common::{constants, Result, WalletError};

/// Account store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Maximum pooled database connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// How long an atomic unit waits for an account lock.
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            acquire_timeout: constants::default_acquire_timeout(),
            lock_timeout: constants::default_lock_timeout(),
        }
    }
}

/// Main ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Account store configuration.
    pub store: StoreConfig,
    /// Page size used for out-of-range history requests.
    pub default_page_limit: usize,
    /// Largest history page a caller may request.
    pub max_page_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            default_page_limit: constants::DEFAULT_PAGE_LIMIT,
            max_page_limit: constants::MAX_PAGE_LIMIT,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("WALLET_DATABASE_URL") {
            if !url.is_empty() {
                config.store.database_url = Some(url);
            }
        }

        if let Ok(max) = std::env::var("WALLET_DB_MAX_CONNECTIONS") {
            if let Ok(max) = max.parse() {
                config.store.max_connections = max;
            }
        }

        if let Ok(ms) = std::env::var("WALLET_LOCK_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.store.lock_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(limit) = std::env::var("WALLET_DEFAULT_PAGE_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.default_page_limit = limit;
            }
        }

        if let Ok(limit) = std::env::var("WALLET_MAX_PAGE_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.max_page_limit = limit;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.store.lock_timeout.is_zero() {
            return Err(WalletError::Configuration("Lock timeout cannot be 0".to_string()));
        }

        if self.store.max_connections == 0 {
            return Err(WalletError::Configuration("Max connections cannot be 0".to_string()));
        }

        if matches!(&self.store.database_url, Some(url) if url.is_empty()) {
            return Err(WalletError::Configuration("Database URL cannot be empty".to_string()));
        }

        if self.default_page_limit == 0 {
            return Err(WalletError::Configuration("Default page limit cannot be 0".to_string()));
        }

        if self.default_page_limit > self.max_page_limit {
            return Err(WalletError::Configuration(
                "Default page limit cannot exceed max page limit".to_string(),
            ));
        }

        Ok(())
    }
}
