//! dblock Core Library
//!
//! This crate provides a single global lock for processes sharing one
//! relational database:
//! - Advisory locks on PostgreSQL
//! - Sentinel-row locking with contention retry on SQLite
//! - Scoped acquisition that releases on every exit path
//! - File and environment configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use domain::locking::{DatabaseLock, LockGuard};
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::LockConfig;
    pub use crate::domain::locking::{BackendKind, DatabaseLock, LockGuard, LockKey, LockState};
    pub use crate::error::{Error, Result};
}
