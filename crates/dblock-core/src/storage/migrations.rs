//! Database migrations
//!
//! Creates the SQLite sentinel table. Migrations are versioned and applied
//! automatically when a SQLite pool is opened. Several processes may open a
//! fresh database at once: the version is re-read under SQLite's write lock,
//! so each migration is applied by exactly one of them and the others wait.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, trace};

use super::sentinel::classify_sqlite_error;
use crate::error::{Error, Result};

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _dblock_migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
"#;

/// Migration 1: sentinel table
///
/// No uniqueness constraint: rows only exist to force a write.
const MIGRATION_V1: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS dblock_sentinels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        holder TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
"#];

/// All migrations in order, indexed by version - 1. One statement per entry.
const MIGRATIONS: &[&[&str]] = &[MIGRATION_V1];

/// Migration status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Highest applied version (0 when none)
    pub current_version: i32,
    /// Version this build expects
    pub target_version: i32,
    /// Whether migrations are pending
    pub needs_migration: bool,
}

/// Apply all pending migrations
///
/// Waits out other writers the same way the sentinel lock does: contention
/// is retried, anything else is returned.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut retries: u64 = 0;
    loop {
        match apply_pending(pool).await {
            Ok(applied) => {
                for version in applied {
                    info!(version, "Applied migration");
                }
                if retries > 0 {
                    debug!(retries, "Migrations waited for another writer");
                }
                return Ok(());
            }
            Err(e) => match classify_sqlite_error(e) {
                Error::Contention(reason) => {
                    retries += 1;
                    trace!(retries, %reason, "Migration contended, retrying");
                    tokio::task::yield_now().await;
                }
                e => return Err(e),
            },
        }
    }
}

/// Check migration status without writing to the database
pub async fn migration_status(pool: &SqlitePool) -> Result<MigrationStatus> {
    let current_version = applied_version(pool).await.map_err(classify_sqlite_error)?;

    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// One attempt at bringing the schema up to date; returns the versions applied
async fn apply_pending(pool: &SqlitePool) -> sqlx::Result<Vec<i32>> {
    if applied_version(pool).await? >= CURRENT_VERSION {
        return Ok(Vec::new());
    }

    // IMMEDIATE takes the write lock up front, before the version is read.
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    sqlx::query(CREATE_MIGRATIONS_TABLE).execute(&mut *tx).await?;
    let current = max_version(&mut tx).await?;

    let mut applied = Vec::new();
    for (index, statements) in MIGRATIONS.iter().enumerate() {
        let version = index as i32 + 1;
        if version <= current {
            continue;
        }

        for statement in statements.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO _dblock_migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        applied.push(version);
    }

    tx.commit().await?;
    Ok(applied)
}

/// Highest applied version, 0 when the tracking table does not exist yet
async fn applied_version(pool: &SqlitePool) -> sqlx::Result<i32> {
    let (tables,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_dblock_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tables == 0 {
        return Ok(0);
    }

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _dblock_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn max_version(conn: &mut SqliteConnection) -> sqlx::Result<i32> {
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _dblock_migrations")
        .fetch_one(&mut *conn)
        .await?;
    Ok(version.unwrap_or(0))
}
