//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dblock_core::domain::locking::{BackendKind, LockConnection};
use dblock_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// In-process stand-in for PostgreSQL's advisory lock table
///
/// Each key maps to a mutex; a session blocks in `pg_advisory_lock(k)` until
/// it owns the mutex for `k`, the way the server blocks the backend.
#[derive(Default)]
pub struct FakeAdvisoryServer {
    keys: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl FakeAdvisoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a new session against this server
    pub fn session(self: &Arc<Self>) -> FakeSession {
        FakeSession {
            server: self.clone(),
            held: HashMap::new(),
            statements: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn key_mutex(&self, key: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.keys
            .lock()
            .unwrap()
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// A session on `FakeAdvisoryServer`
pub struct FakeSession {
    server: Arc<FakeAdvisoryServer>,
    held: HashMap<i64, OwnedMutexGuard<()>>,
    statements: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    pub fn statements(&self) -> Arc<Mutex<Vec<String>>> {
        self.statements.clone()
    }
}

fn parse_call(statement: &str, function: &str) -> Option<i64> {
    statement
        .strip_prefix("SELECT ")?
        .strip_prefix(function)?
        .strip_prefix('(')?
        .strip_suffix(')')?
        .parse()
        .ok()
}

#[async_trait]
impl LockConnection for FakeSession {
    fn backend_kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.statements.lock().unwrap().push(statement.to_string());

        if let Some(key) = parse_call(statement, "pg_advisory_lock") {
            let mutex = self.server.key_mutex(key);
            let guard = mutex.lock_owned().await;
            self.held.insert(key, guard);
            Ok(())
        } else if let Some(key) = parse_call(statement, "pg_advisory_unlock") {
            self.held.remove(&key);
            Ok(())
        } else {
            Err(Error::DatabaseError(sqlx::Error::Protocol(format!(
                "unexpected statement: {}",
                statement
            ))))
        }
    }
}
