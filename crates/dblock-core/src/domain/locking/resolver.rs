//! Backend resolver
//!
//! Maps a backend kind to the strategy that locks it. No I/O happens here.

use tracing::debug;

use super::connection::LockConnection;
use super::strategy::{AdvisoryLockStrategy, LockOperation, RetryInsertStrategy, UnsupportedStrategy};
use super::types::{BackendKind, LockKey};

/// Pick the lock operation for `backend`
///
/// Unknown engines, and SQLite connections that expose no sentinel table,
/// get an `UnsupportedStrategy`; they are never treated as a known engine.
pub fn resolve(
    backend: &BackendKind,
    key: LockKey,
    connection: Box<dyn LockConnection>,
) -> Box<dyn LockOperation> {
    let operation: Box<dyn LockOperation> = match backend {
        BackendKind::Postgres => Box::new(AdvisoryLockStrategy::new(connection, key)),
        BackendKind::Sqlite => match connection.sentinel_store() {
            Some(store) => Box::new(RetryInsertStrategy::new(store)),
            None => Box::new(UnsupportedStrategy::new(format!(
                "{} (no sentinel table)",
                backend
            ))),
        },
        BackendKind::Unknown(vendor) => Box::new(UnsupportedStrategy::new(vendor.clone())),
    };

    debug!(backend = %backend, strategy = operation.name(), "Resolved lock strategy");
    operation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::locking::test_support::{RecordingConnection, ScriptedSentinelStore};
    use crate::error::Error;
    use std::sync::Arc;

    #[test]
    fn test_postgres_resolves_to_advisory() {
        let connection = RecordingConnection::new(BackendKind::Postgres);
        let operation = resolve(&BackendKind::Postgres, LockKey::DEFAULT, Box::new(connection));
        assert_eq!(operation.name(), "advisory");
    }

    #[test]
    fn test_sqlite_resolves_to_retry_insert() {
        let store = Arc::new(ScriptedSentinelStore::new(vec![]));
        let connection = RecordingConnection::new(BackendKind::Sqlite).with_sentinels(store);
        let operation = resolve(&BackendKind::Sqlite, LockKey::DEFAULT, Box::new(connection));
        assert_eq!(operation.name(), "retry-insert");
    }

    #[test]
    fn test_sqlite_without_sentinels_is_unsupported() {
        let connection = RecordingConnection::new(BackendKind::Sqlite);
        let operation = resolve(&BackendKind::Sqlite, LockKey::DEFAULT, Box::new(connection));
        assert_eq!(operation.name(), "unsupported");
    }

    #[tokio::test]
    async fn test_unknown_backend_never_falls_back() {
        let kind = BackendKind::from_vendor("mysql");
        let connection = RecordingConnection::new(kind.clone());
        let statements = connection.statements();
        let mut operation = resolve(&kind, LockKey::DEFAULT, Box::new(connection));

        assert_eq!(operation.name(), "unsupported");
        let err = operation.acquire().await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedBackend(ref v) if v == "mysql"));
        assert!(statements.lock().unwrap().is_empty());
    }
}
