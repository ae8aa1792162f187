//! Database-backed mutual exclusion
//!
//! One global lock shared by every process that talks to the same database.
//! The way the lock is taken depends on the engine behind the connection.
//!
//! # Architecture
//!
//! - **Types**: `LockKey`, `BackendKind`, `LockState`, `SentinelRecord`
//! - **Contracts**: `LockConnection`, `SentinelStore`
//! - **Strategies**: `AdvisoryLockStrategy` (PostgreSQL),
//!   `RetryInsertStrategy` (SQLite), `UnsupportedStrategy`
//! - **Resolver**: picks the strategy for a backend
//! - **Wait policy**: native blocking vs. retry on contention
//! - **DatabaseLock**: scoped acquisition over all of the above
//!
//! # Example
//!
//! ```ignore
//! use dblock_core::config::LockConfig;
//! use dblock_core::domain::locking::DatabaseLock;
//!
//! let mut lock = DatabaseLock::connect("postgres://localhost/app", &LockConfig::default()).await?;
//!
//! lock.run(|| async {
//!     // Only one process at a time gets here
//!     Ok::<_, dblock_core::Error>(())
//! })
//! .await?;
//! ```

pub mod connection;
pub mod lock;
pub mod resolver;
pub mod strategy;
pub mod types;
pub mod wait;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types
pub use connection::{LockConnection, SentinelStore};
pub use lock::{DatabaseLock, LockGuard};
pub use resolver::resolve;
pub use strategy::{AdvisoryLockStrategy, LockOperation, RetryInsertStrategy, UnsupportedStrategy};
pub use types::{BackendKind, LockKey, LockState, SentinelRecord};
pub use wait::WaitPolicy;
