//! Database connection setup
//!
//! Opens sqlx pools for the engines the lock supports.

use crate::config::LockConfig;
use crate::error::Result;
use crate::storage::migrations;
use crate::storage::sentinel::is_sqlite_contention;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, trace};

/// URL of a private in-memory SQLite database
const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

/// Database configuration options
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to create the sentinel table automatically (SQLite only)
    pub auto_migrate: bool,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout: Duration,
    /// Journal mode (default: WAL for better concurrency)
    pub journal_mode: SqliteJournalMode,
    /// Synchronous mode (default: NORMAL for balance of safety/performance)
    pub synchronous: SqliteSynchronous,
}

impl DatabaseConfig {
    /// Create a config for `url` using the pool settings from `config`
    pub fn from_lock_config(url: impl Into<String>, config: &LockConfig) -> Self {
        Self {
            url: url.into(),
            max_connections: config.max_connections,
            auto_migrate: true,
            busy_timeout: config.sqlite_busy_timeout(),
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
        }
    }

    /// Create a config for a SQLite database file
    pub fn with_sqlite_path(path: &Path) -> Self {
        Self::from_lock_config(sqlite_url(path), &LockConfig::default())
    }

    /// Create a config for an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Self {
        Self {
            max_connections: 1, // In-memory requires single connection
            ..Self::from_lock_config(SQLITE_MEMORY_URL, &LockConfig::default())
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the SQLite busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Disable automatic migrations
    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    /// Filesystem path of a SQLite URL, if it names a file
    fn sqlite_file(&self) -> Option<PathBuf> {
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path == ":memory:" {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

/// Build a SQLite URL for a file, creating it if missing
pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite:{}?mode=rwc", path.display())
}

/// Open a SQLite pool and make sure the sentinel table exists
pub async fn connect_sqlite(config: &DatabaseConfig) -> Result<SqlitePool> {
    // Ensure the directory exists
    if let Some(file) = config.sqlite_file() {
        if let Some(parent) = file.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let connect_options = SqliteConnectOptions::from_str(&config.url)?
        .journal_mode(config.journal_mode)
        .synchronous(config.synchronous)
        .busy_timeout(config.busy_timeout)
        .create_if_missing(true);

    // Switching a fresh file to WAL needs the write lock, so opening can
    // contend with other processes doing the same.
    let pool = loop {
        let attempt = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options.clone())
            .await;
        match attempt {
            Ok(pool) => break pool,
            Err(e) if is_sqlite_contention(&e) => {
                trace!(error = %e, "Opening SQLite contended, retrying");
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    debug!(
        url = %config.url,
        busy_timeout_ms = config.busy_timeout.as_millis(),
        "Connected to SQLite"
    );

    if config.auto_migrate {
        migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Open a PostgreSQL pool
pub async fn connect_postgres(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    debug!(max_connections = config.max_connections, "Connected to PostgreSQL");
    Ok(pool)
}
