//! Per-backend lock operations
//!
//! Each `LockOperation` knows how to take and give back the lock on one kind
//! of engine. A single attempt lives here; waiting and retrying is the job of
//! the wait policy.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

use super::connection::{LockConnection, SentinelStore};
use super::types::{LockKey, SentinelRecord};
use crate::error::{Error, Result};

/// Strategy bound to one lock instance
#[async_trait]
pub trait LockOperation: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Take the lock once
    async fn acquire(&mut self) -> Result<()>;

    /// Give back the lock taken by `acquire`
    async fn release(&mut self) -> Result<()>;
}

/// Native session-scoped advisory lock (PostgreSQL)
///
/// `pg_advisory_lock` blocks inside the engine until the key is free, so a
/// single statement is enough. The strategy owns the session so that the
/// unlock runs on the same connection as the lock.
pub struct AdvisoryLockStrategy {
    connection: Box<dyn LockConnection>,
    key: LockKey,
}

impl AdvisoryLockStrategy {
    /// Create a strategy locking `key` on `connection`
    pub fn new(connection: Box<dyn LockConnection>, key: LockKey) -> Self {
        Self { connection, key }
    }

    /// Key this strategy locks
    pub fn key(&self) -> LockKey {
        self.key
    }

    /// Statement taking the lock
    pub fn lock_statement(&self) -> String {
        format!("SELECT pg_advisory_lock({})", self.key.value())
    }

    /// Statement giving back the lock
    pub fn unlock_statement(&self) -> String {
        format!("SELECT pg_advisory_unlock({})", self.key.value())
    }
}

#[async_trait]
impl LockOperation for AdvisoryLockStrategy {
    fn name(&self) -> &'static str {
        "advisory"
    }

    async fn acquire(&mut self) -> Result<()> {
        let statement = self.lock_statement();
        debug!(key = %self.key, "Requesting advisory lock");
        self.connection.execute(&statement).await
    }

    async fn release(&mut self) -> Result<()> {
        let statement = self.unlock_statement();
        debug!(key = %self.key, "Releasing advisory lock");
        self.connection.execute(&statement).await
    }
}

/// Sentinel-row lock for single-writer engines (SQLite)
///
/// Inserting a row forces the caller to queue behind any other writer; the
/// engine's "database is locked" error is the signal that someone else holds
/// the write turn. The insert autocommits, so once it lands another process
/// can insert its own row: this orders entries into the critical section
/// rather than excluding them for its whole duration.
pub struct RetryInsertStrategy {
    store: Arc<dyn SentinelStore>,
    record: Option<SentinelRecord>,
}

impl RetryInsertStrategy {
    /// Create a strategy over a sentinel table
    pub fn new(store: Arc<dyn SentinelStore>) -> Self {
        Self {
            store,
            record: None,
        }
    }

    /// Record created by the last successful `acquire`
    pub fn record(&self) -> Option<&SentinelRecord> {
        self.record.as_ref()
    }
}

#[async_trait]
impl LockOperation for RetryInsertStrategy {
    fn name(&self) -> &'static str {
        "retry-insert"
    }

    async fn acquire(&mut self) -> Result<()> {
        if let Some(record) = &self.record {
            return Err(Error::InvalidState(format!(
                "sentinel {} is already held by this lock",
                record.id
            )));
        }
        let record = self.store.create().await?;
        debug!(sentinel_id = record.id, "Sentinel record created");
        self.record = Some(record);
        Ok(())
    }

    /// Delete the sentinel row
    ///
    /// The record is kept until the delete lands, so a failed release can be
    /// retried and the leftover row stays visible through `record`. A row that
    /// is already gone cannot be cleaned up and is forgotten.
    async fn release(&mut self) -> Result<()> {
        let record = self.record.clone().ok_or_else(|| {
            Error::InvalidState("release called without a held sentinel record".to_string())
        })?;

        // Deleting is a write too and queues behind other writers the same way.
        loop {
            match self.store.delete(&record).await {
                Ok(()) => {
                    debug!(sentinel_id = record.id, "Sentinel record deleted");
                    self.record = None;
                    return Ok(());
                }
                Err(Error::Contention(reason)) => {
                    trace!(sentinel_id = record.id, %reason, "Delete contended, retrying");
                    tokio::task::yield_now().await;
                }
                Err(Error::ReleaseFailed(reason)) => {
                    self.record = None;
                    return Err(Error::ReleaseFailed(reason));
                }
                Err(e) => {
                    return Err(Error::ReleaseFailed(format!(
                        "sentinel {} (holder {}) was not deleted: {}",
                        record.id, record.holder, e
                    )));
                }
            }
        }
    }
}

/// Fallback for engines without a locking strategy
pub struct UnsupportedStrategy {
    vendor: String,
}

impl UnsupportedStrategy {
    /// Create a fallback for the named vendor
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
        }
    }

    /// Vendor this fallback was created for
    pub fn vendor(&self) -> &str {
        &self.vendor
    }
}

#[async_trait]
impl LockOperation for UnsupportedStrategy {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    async fn acquire(&mut self) -> Result<()> {
        Err(Error::UnsupportedBackend(self.vendor.clone()))
    }

    async fn release(&mut self) -> Result<()> {
        Err(Error::UnsupportedBackend(self.vendor.clone()))
    }
}
