//! Error types for dblock

use thiserror::Error;

/// Result type alias using dblock's Error
pub type Result<T> = std::result::Result<T, Error>;

/// dblock error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Lock errors (E300-E399)
    #[error("Lock contention: {0}")]
    Contention(String),

    #[error("Operation not implemented for {0}")]
    UnsupportedBackend(String),

    #[error("Lock release failed: {0}")]
    ReleaseFailed(String),

    #[error("Invalid lock state: {0}")]
    InvalidState(String),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Contention(_) => "E300",
            Self::UnsupportedBackend(_) => "E302",
            Self::ReleaseFailed(_) => "E303",
            Self::InvalidState(_) => "E304",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::UnsupportedBackend(_) => {
                Some("Use a postgres:// or sqlite: database URL".to_string())
            }
            Self::ReleaseFailed(_) => {
                Some("Check the dblock_sentinels table for leftover rows".to_string())
            }
            Self::ConfigError(_) => {
                Some("Check DBLOCK_TASK_LOCK_ID and the dblock config.toml".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error is the transient "another writer holds the engine" signal
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}
