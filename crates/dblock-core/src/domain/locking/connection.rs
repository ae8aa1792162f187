//! Database contracts consumed by the lock
//!
//! The lock never talks to a driver directly. It needs a connection that can
//! execute a statement and report which engine it targets, and, for engines
//! without advisory locks, a table it can insert into and delete from.

use async_trait::async_trait;
use std::sync::Arc;

use super::types::{BackendKind, SentinelRecord};
use crate::error::Result;

/// A single database session
///
/// Advisory locks are session-scoped, so one `LockConnection` must carry both
/// the lock and the unlock statement.
#[async_trait]
pub trait LockConnection: Send {
    /// Engine this connection targets
    fn backend_kind(&self) -> BackendKind;

    /// Execute a statement, discarding any rows
    async fn execute(&mut self, statement: &str) -> Result<()>;

    /// Sentinel table reachable through this connection, if the engine uses one
    fn sentinel_store(&self) -> Option<Arc<dyn SentinelStore>> {
        None
    }
}

/// Table of sentinel records
///
/// Implementations report writer contention as `Error::Contention`; any other
/// error is treated as fatal by the caller.
#[async_trait]
pub trait SentinelStore: Send + Sync {
    /// Insert a new record
    async fn create(&self) -> Result<SentinelRecord>;

    /// Delete a record previously returned by `create`
    async fn delete(&self, record: &SentinelRecord) -> Result<()>;
}
