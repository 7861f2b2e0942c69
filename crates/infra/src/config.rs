//! Store configuration from the process environment.
//!
//! The pool is constructed once by the process entry point and handed
//! to the engines; nothing in this workspace holds a global connection.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use stockcell_core::{LedgerError, LedgerResult};

const DEFAULT_POOL_SIZE: u32 = 8;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    /// Upper bound of the shared connection pool.
    pub max_connections: u32,
    /// How long a caller waits for a pooled connection before the
    /// operation fails with a retriable error instead of hanging.
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: DEFAULT_POOL_SIZE,
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
        }
    }

    /// Read `DATABASE_URL`, `STOCKCELL_DB_POOL_SIZE` and
    /// `STOCKCELL_DB_ACQUIRE_TIMEOUT_MS`, with defaults for the latter
    /// two.
    pub fn from_env() -> LedgerResult<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| LedgerError::validation("DATABASE_URL is not set"))?;

        let max_connections = env_parse("STOCKCELL_DB_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        let acquire_timeout_ms =
            env_parse("STOCKCELL_DB_ACQUIRE_TIMEOUT_MS", DEFAULT_ACQUIRE_TIMEOUT_MS)?;

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
        })
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> LedgerResult<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| LedgerError::validation(format!("{name} is not a valid number: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Open the shared connection pool.
pub async fn connect(config: &StoreConfig) -> LedgerResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .map_err(|e| LedgerError::unavailable(format!("failed to open pool: {e}")))
}
