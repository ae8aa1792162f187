//! Wait policies
//!
//! How long and in which way to wait for a lock depends on the engine. The
//! advisory backend blocks inside the server; the sentinel backend has to
//! keep knocking until the engine stops reporting contention.

use tracing::{debug, trace};

use super::strategy::LockOperation;
use super::types::BackendKind;
use crate::error::{Error, Result};

/// Number of contention retries between progress log lines
const RETRY_LOG_INTERVAL: u64 = 1_000;

/// Blocking behaviour for a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitPolicy {
    /// One call; the engine blocks until the lock is granted
    Native,
    /// Retry immediately on contention, forever; any other error is fatal
    RetryOnContention,
    /// No policy exists for this vendor
    Unsupported { vendor: String },
}

impl WaitPolicy {
    /// Policy matching a backend kind
    pub fn for_backend(backend: &BackendKind) -> Self {
        match backend {
            BackendKind::Postgres => Self::Native,
            BackendKind::Sqlite => Self::RetryOnContention,
            BackendKind::Unknown(vendor) => Self::Unsupported {
                vendor: vendor.clone(),
            },
        }
    }

    /// Drive `operation` until the lock is held
    ///
    /// Returns the number of contention retries it took. Contention never
    /// escapes this call.
    pub async fn wait(&self, operation: &mut dyn LockOperation) -> Result<u64> {
        match self {
            Self::Native => {
                operation.acquire().await?;
                Ok(0)
            }
            Self::RetryOnContention => {
                let mut retries: u64 = 0;
                loop {
                    match operation.acquire().await {
                        Ok(()) => return Ok(retries),
                        Err(Error::Contention(reason)) => {
                            retries += 1;
                            if retries % RETRY_LOG_INTERVAL == 0 {
                                debug!(retries, %reason, "Still waiting for the write lock");
                            } else {
                                trace!(retries, %reason, "Acquire contended, retrying");
                            }
                            // Not a backoff: lets other tasks on this runtime run.
                            tokio::task::yield_now().await;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            Self::Unsupported { vendor } => Err(Error::UnsupportedBackend(format!(
                "database lock on {}",
                vendor
            ))),
        }
    }
}
