//! Storage layer - sqlx implementations of the lock contracts
//!
//! # Architecture
//!
//! - `database`: pool setup for SQLite and PostgreSQL
//! - `migrations`: sentinel table schema versioning
//! - `sentinel`: SQLite sentinel table and contention classification
//! - `connection`: `LockConnection` implementations
//!
//! # Usage
//!
//! ```ignore
//! use dblock_core::storage::open_lock_connection;
//!
//! let connection = open_lock_connection("sqlite:app.db?mode=rwc", &config).await?;
//! let lock = DatabaseLock::new(connection, &config);
//! ```

pub mod connection;
pub mod database;
pub mod migrations;
pub mod sentinel;

// Re-export commonly used types
pub use connection::{PgLockConnection, SqliteLockConnection, open_lock_connection};
pub use database::{DatabaseConfig, connect_postgres, connect_sqlite, sqlite_url};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
pub use sentinel::{SqliteSentinelStore, classify_sqlite_error, is_sqlite_contention};
