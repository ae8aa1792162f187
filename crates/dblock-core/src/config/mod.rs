//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::locking::LockKey;
use crate::error::{Error, Result};

/// Environment variable overriding the configured lock identifier
pub const TASK_LOCK_ID_ENV: &str = "DBLOCK_TASK_LOCK_ID";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "DBLOCK_CONFIG_DIR";

/// Default SQLite busy timeout, matching sqlx's own default
const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Default maximum connections in the pool
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// dblock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Identifier of the task lock. `None` and `0` both mean the default key.
    pub task_lock_id: Option<i64>,
    /// How long SQLite waits on a locked database before reporting contention
    pub sqlite_busy_timeout_ms: u64,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            task_lock_id: None,
            sqlite_busy_timeout_ms: DEFAULT_SQLITE_BUSY_TIMEOUT_MS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl LockConfig {
    /// Set the task lock identifier
    pub fn with_task_lock_id(mut self, id: i64) -> Self {
        self.task_lock_id = Some(id);
        self
    }

    /// Set the SQLite busy timeout
    pub fn with_sqlite_busy_timeout(mut self, timeout: Duration) -> Self {
        self.sqlite_busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// The lock key this configuration selects
    pub fn lock_key(&self) -> LockKey {
        LockKey::from_config(self.task_lock_id)
    }

    /// SQLite busy timeout as a `Duration`
    pub fn sqlite_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.sqlite_busy_timeout_ms)
    }

    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("dblock")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location, then apply env overrides
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            LockConfig::default()
        };
        config.apply_env_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: LockConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Apply overrides from an environment lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(TASK_LOCK_ID_ENV) {
            let raw = raw.trim();
            if !raw.is_empty() {
                let id: i64 = raw.parse().map_err(|_| {
                    Error::ConfigError(format!("Invalid {} value: {}", TASK_LOCK_ID_ENV, raw))
                })?;
                self.task_lock_id = Some(id);
            }
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::ConfigError(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
