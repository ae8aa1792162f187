//! The database lock
//!
//! `DatabaseLock` ties the resolver, the strategy and the wait policy
//! together. Entering the lock hands back a `LockGuard`; only a guard can
//! release, so a failed acquisition can never be followed by a release.

use futures_util::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connection::LockConnection;
use super::resolver::resolve;
use super::strategy::LockOperation;
use super::types::{BackendKind, LockKey, LockState};
use super::wait::WaitPolicy;
use crate::config::LockConfig;
use crate::error::{Error, Result};
use crate::storage::connection::open_lock_connection;

/// Process-wide mutual exclusion backed by the shared database
pub struct DatabaseLock {
    backend: BackendKind,
    key: LockKey,
    operation: Box<dyn LockOperation>,
    policy: WaitPolicy,
    state: LockState,
}

impl DatabaseLock {
    /// Bind a lock to `connection`
    ///
    /// The backend is read from the connection once; the key comes from
    /// `config` and defaults to 1.
    pub fn new(connection: Box<dyn LockConnection>, config: &LockConfig) -> Self {
        let backend = connection.backend_kind();
        let key = config.lock_key();
        let operation = resolve(&backend, key, connection);
        let policy = WaitPolicy::for_backend(&backend);

        Self {
            backend,
            key,
            operation,
            policy,
            state: LockState::Unacquired,
        }
    }

    /// Open a dedicated connection for `url` and bind a lock to it
    pub async fn connect(url: &str, config: &LockConfig) -> Result<Self> {
        let connection = open_lock_connection(url, config).await?;
        Ok(Self::new(connection, config))
    }

    /// Backend this lock was resolved for
    pub fn backend(&self) -> &BackendKind {
        &self.backend
    }

    /// Key this lock uses
    pub fn key(&self) -> LockKey {
        self.key
    }

    /// Current lifecycle state
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Name of the bound strategy
    pub fn strategy(&self) -> &'static str {
        self.operation.name()
    }

    /// Enter the lock, waiting as long as it takes
    ///
    /// Returns only once the lock is held, or with the fatal error that
    /// stopped acquisition. A lock can be entered once.
    pub async fn acquire(&mut self) -> Result<LockGuard<'_>> {
        if self.state != LockState::Unacquired {
            return Err(Error::InvalidState(format!(
                "cannot acquire a lock that is {}",
                self.state
            )));
        }

        self.state = LockState::Acquiring;
        debug!(
            backend = %self.backend,
            key = %self.key,
            strategy = self.operation.name(),
            "Attempting to acquire database lock"
        );

        let start = Instant::now();
        match self.policy.wait(self.operation.as_mut()).await {
            Ok(retries) => {
                self.state = LockState::Held;
                info!(
                    backend = %self.backend,
                    key = %self.key,
                    retries,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Database lock acquired"
                );
                Ok(LockGuard {
                    lock: self,
                    retries,
                    acquired_at: Instant::now(),
                    released: false,
                })
            }
            Err(e) => {
                self.state = LockState::Failed;
                warn!(
                    backend = %self.backend,
                    key = %self.key,
                    error = %e,
                    "Database lock acquisition failed"
                );
                Err(e)
            }
        }
    }

    /// Run `section` while holding the lock
    ///
    /// The lock is released on every way out of `section`: success, error or
    /// panic (the panic is resumed after releasing). If acquisition fails the
    /// section does not run and no release is attempted. When both the
    /// section and the release fail, the section's error is returned and the
    /// release error is logged.
    pub async fn run<F, Fut, T, E>(&mut self, section: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let guard = self.acquire().await?;

        let outcome = AssertUnwindSafe(async move { section().await })
            .catch_unwind()
            .await;
        let released = guard.release().await;

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(e) = released {
                    warn!(error = %e, "Release failed after critical section error");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(e) = released {
                    warn!(error = %e, "Release failed after critical section panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl fmt::Debug for DatabaseLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseLock")
            .field("backend", &self.backend)
            .field("key", &self.key)
            .field("strategy", &self.operation.name())
            .field("state", &self.state)
            .finish()
    }
}

/// Proof that a `DatabaseLock` is held
///
/// Release is asynchronous and cannot run from `Drop`; call `release`.
/// Dropping an unreleased guard leaves the lock held and logs a warning.
#[must_use = "the lock stays held until `release` is awaited"]
pub struct LockGuard<'a> {
    lock: &'a mut DatabaseLock,
    retries: u64,
    acquired_at: Instant,
    released: bool,
}

impl LockGuard<'_> {
    /// Key of the held lock
    pub fn key(&self) -> LockKey {
        self.lock.key
    }

    /// Backend of the held lock
    pub fn backend(&self) -> &BackendKind {
        &self.lock.backend
    }

    /// Contention retries it took to acquire
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// How long the lock has been held
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Leave the critical section
    ///
    /// Runs the strategy's release exactly once. A failed release is
    /// returned and leaves the lock in `ReleaseFailed`.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let result = self.lock.operation.release().await;
        self.lock.state = match &result {
            Ok(()) => LockState::Released,
            Err(_) => LockState::ReleaseFailed,
        };

        match &result {
            Ok(()) => info!(
                backend = %self.lock.backend,
                key = %self.lock.key,
                held_ms = self.held_for().as_millis(),
                "Database lock released"
            ),
            Err(e) => warn!(
                backend = %self.lock.backend,
                key = %self.lock.key,
                error = %e,
                "Database lock release failed"
            ),
        }
        result
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                backend = %self.lock.backend,
                key = %self.lock.key,
                "Lock guard dropped without release; lock is still held"
            );
        }
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("backend", &self.lock.backend)
            .field("key", &self.lock.key)
            .field("retries", &self.retries)
            .field("released", &self.released)
            .finish()
    }
}

impl fmt::Display for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatabaseLock[{}:{}]", self.lock.backend, self.lock.key)
    }
}
