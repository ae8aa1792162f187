//! sqlx-backed lock connections

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use super::database::{DatabaseConfig, connect_postgres, connect_sqlite};
use super::sentinel::{SqliteSentinelStore, classify_sqlite_error};
use crate::config::LockConfig;
use crate::domain::locking::{BackendKind, LockConnection, SentinelStore};
use crate::error::{Error, Result};

/// One PostgreSQL session checked out of a pool
///
/// The session stays checked out for the lifetime of this value, so the
/// advisory lock and unlock run on the same backend process. If the value is
/// dropped while the lock is held, the session goes back to the pool still
/// holding it.
pub struct PgLockConnection {
    conn: PoolConnection<Postgres>,
}

impl PgLockConnection {
    /// Open a single-connection pool for `url` and check out its session
    pub async fn connect(url: &str, config: &LockConfig) -> Result<Self> {
        let pool = connect_postgres(&DatabaseConfig::from_lock_config(url, config).max_connections(1))
            .await?;
        Self::from_pool(&pool).await
    }

    /// Check out a session from an existing pool
    pub async fn from_pool(pool: &PgPool) -> Result<Self> {
        let conn = pool.acquire().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl LockConnection for PgLockConnection {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        sqlx::query(statement).execute(&mut *self.conn).await?;
        Ok(())
    }
}

/// SQLite pool together with its sentinel table
#[derive(Debug, Clone)]
pub struct SqliteLockConnection {
    pool: SqlitePool,
    sentinels: Arc<SqliteSentinelStore>,
}

impl SqliteLockConnection {
    /// Wrap a pool whose schema is already migrated
    pub fn new(pool: SqlitePool) -> Self {
        let sentinels = Arc::new(SqliteSentinelStore::new(pool.clone()));
        Self { pool, sentinels }
    }

    /// Open a pool for `url`, creating the sentinel table if needed
    pub async fn connect(url: &str, config: &LockConfig) -> Result<Self> {
        let pool = connect_sqlite(&DatabaseConfig::from_lock_config(url, config)).await?;
        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Sentinel table behind this connection
    pub fn sentinels(&self) -> &SqliteSentinelStore {
        &self.sentinels
    }
}

#[async_trait]
impl LockConnection for SqliteLockConnection {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlite_error)?;
        Ok(())
    }

    fn sentinel_store(&self) -> Option<Arc<dyn SentinelStore>> {
        Some(self.sentinels.clone())
    }
}

/// Open a lock connection for `url`, picking the driver from its scheme
///
/// Schemes without a driver fail here with `UnsupportedBackend`.
pub async fn open_lock_connection(url: &str, config: &LockConfig) -> Result<Box<dyn LockConnection>> {
    let backend = BackendKind::from_url(url);
    debug!(backend = %backend, "Opening lock connection");

    match backend {
        BackendKind::Postgres => Ok(Box::new(PgLockConnection::connect(url, config).await?)),
        BackendKind::Sqlite => Ok(Box::new(SqliteLockConnection::connect(url, config).await?)),
        BackendKind::Unknown(vendor) => Err(Error::UnsupportedBackend(vendor)),
    }
}
