//! Lock types

use chrono::{DateTime, Utc};
use std::fmt;

/// Identifier of a logical lock
///
/// Equal keys contend with each other on the advisory backend; distinct keys
/// never do. The sentinel backend ignores the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(i64);

impl LockKey {
    /// Key used when nothing is configured
    pub const DEFAULT: LockKey = LockKey(1);

    /// Create a key from a raw value
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Resolve a configured value, treating `None` and `0` as unset
    pub fn from_config(value: Option<i64>) -> Self {
        match value {
            Some(0) | None => Self::DEFAULT,
            Some(v) => Self(v),
        }
    }

    /// Raw key value
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl Default for LockKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage engine behind a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Advisory-capable engine (PostgreSQL)
    Postgres,
    /// Single-writer serializing engine (SQLite)
    Sqlite,
    /// Anything else, carrying the vendor name as reported
    Unknown(String),
}

impl BackendKind {
    /// Parse a vendor name such as `"postgresql"` or `"sqlite"`
    pub fn from_vendor(vendor: &str) -> Self {
        match vendor.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Self::Postgres,
            "sqlite" | "sqlite3" => Self::Sqlite,
            _ => Self::Unknown(vendor.trim().to_string()),
        }
    }

    /// Derive the backend from a connection URL scheme
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split_once(':').map(|(scheme, _)| scheme).unwrap_or(url);
        Self::from_vendor(scheme)
    }

    /// Vendor name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Postgres => "postgresql",
            Self::Sqlite => "sqlite",
            Self::Unknown(vendor) => vendor,
        }
    }

    /// Whether the engine provides native session-scoped advisory locks
    pub fn supports_advisory_locks(&self) -> bool {
        matches!(self, Self::Postgres)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a `DatabaseLock`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Constructed, never acquired
    Unacquired,
    /// Waiting on the backend
    Acquiring,
    /// Held by this instance
    Held,
    /// Released after being held
    Released,
    /// Acquisition raised; nothing was held
    Failed,
    /// Release raised; other contenders may still see the lock as held
    ReleaseFailed,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unacquired => write!(f, "unacquired"),
            Self::Acquiring => write!(f, "acquiring"),
            Self::Held => write!(f, "held"),
            Self::Released => write!(f, "released"),
            Self::Failed => write!(f, "failed"),
            Self::ReleaseFailed => write!(f, "release-failed"),
        }
    }
}

/// A row whose existence encodes "someone is inside the critical section"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelRecord {
    /// Row id
    pub id: i64,

    /// `pid@host` of the creating process, for diagnostics only
    pub holder: String,

    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl SentinelRecord {
    /// Describe the current process as a holder
    pub fn current_holder() -> String {
        format!(
            "{}@{}",
            std::process::id(),
            gethostname::gethostname().to_string_lossy()
        )
    }
}
