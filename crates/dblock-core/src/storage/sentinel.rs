//! SQLite sentinel table
//!
//! Rows in `dblock_sentinels` exist only to force a write through SQLite's
//! single-writer lock. Contention shows up as `SQLITE_BUSY`/`SQLITE_LOCKED`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::locking::{SentinelRecord, SentinelStore};
use crate::error::{Error, Result};

/// Primary result code for "the database file is locked"
const SQLITE_BUSY: i32 = 5;

/// Primary result code for "a table in the database is locked"
const SQLITE_LOCKED: i32 = 6;

/// Whether a driver error means another writer holds SQLite's write lock
///
/// Extended result codes (e.g. `SQLITE_BUSY_SNAPSHOT`) carry the primary
/// code in their low byte.
pub fn is_sqlite_contention(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };

    let by_code = db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false);

    by_code
        || db_err.message().contains("database is locked")
        || db_err.message().contains("database table is locked")
}

/// Map a SQLite driver error into the lock's error taxonomy
pub fn classify_sqlite_error(err: sqlx::Error) -> Error {
    if is_sqlite_contention(&err) {
        Error::Contention(err.to_string())
    } else {
        Error::DatabaseError(err)
    }
}

/// Sentinel table stored in SQLite
#[derive(Debug, Clone)]
pub struct SqliteSentinelStore {
    pool: SqlitePool,
}

impl SqliteSentinelStore {
    /// Create a store over a pool whose schema is already migrated
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of sentinel rows currently present
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dblock_sentinels")
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlite_error)?;
        Ok(count)
    }
}

#[async_trait]
impl SentinelStore for SqliteSentinelStore {
    async fn create(&self) -> Result<SentinelRecord> {
        let holder = SentinelRecord::current_holder();
        let created_at = Utc::now();

        let result = sqlx::query("INSERT INTO dblock_sentinels (holder, created_at) VALUES (?, ?)")
            .bind(&holder)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlite_error)?;

        Ok(SentinelRecord {
            id: result.last_insert_rowid(),
            holder,
            created_at,
        })
    }

    async fn delete(&self, record: &SentinelRecord) -> Result<()> {
        let result = sqlx::query("DELETE FROM dblock_sentinels WHERE id = ?")
            .bind(record.id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlite_error)?;

        if result.rows_affected() == 0 {
            return Err(Error::ReleaseFailed(format!(
                "sentinel {} no longer exists",
                record.id
            )));
        }
        Ok(())
    }
}
