//! Test doubles for the locking contracts

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::connection::{LockConnection, SentinelStore};
use super::types::{BackendKind, SentinelRecord};
use crate::error::{Error, Result};

/// Scripted result of one store call
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    Contention,
    Fail(String),
}

/// Connection that records every statement it is asked to run
pub struct RecordingConnection {
    kind: BackendKind,
    statements: Arc<Mutex<Vec<String>>>,
    failure: Option<String>,
    sentinels: Option<Arc<ScriptedSentinelStore>>,
}

impl RecordingConnection {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            statements: Arc::new(Mutex::new(Vec::new())),
            failure: None,
            sentinels: None,
        }
    }

    /// Fail every statement with a driver error carrying `message`
    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn with_sentinels(mut self, store: Arc<ScriptedSentinelStore>) -> Self {
        self.sentinels = Some(store);
        self
    }

    pub fn statements(&self) -> Arc<Mutex<Vec<String>>> {
        self.statements.clone()
    }
}

#[async_trait]
impl LockConnection for RecordingConnection {
    fn backend_kind(&self) -> BackendKind {
        self.kind.clone()
    }

    async fn execute(&mut self, statement: &str) -> Result<()> {
        self.statements.lock().unwrap().push(statement.to_string());
        match &self.failure {
            Some(message) => Err(driver_error(message)),
            None => Ok(()),
        }
    }

    fn sentinel_store(&self) -> Option<Arc<dyn SentinelStore>> {
        self.sentinels
            .clone()
            .map(|store| store as Arc<dyn SentinelStore>)
    }
}

/// Sentinel table whose create/delete results follow a script
///
/// Calls beyond the end of a script succeed.
pub struct ScriptedSentinelStore {
    create_script: Mutex<VecDeque<Outcome>>,
    delete_script: Mutex<VecDeque<Outcome>>,
    live: Mutex<Vec<i64>>,
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl ScriptedSentinelStore {
    pub fn new(create_script: Vec<Outcome>) -> Self {
        Self {
            create_script: Mutex::new(create_script.into()),
            delete_script: Mutex::new(VecDeque::new()),
            live: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delete_script(self, script: Vec<Outcome>) -> Self {
        *self.delete_script.lock().unwrap() = script.into();
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn live_ids(&self) -> Vec<i64> {
        self.live.lock().unwrap().clone()
    }

    /// Drop every record behind the lock's back
    pub fn clear(&self) {
        self.live.lock().unwrap().clear();
    }
}

/// Non-contention failure as the sqlx layer would report it
pub fn driver_error(message: &str) -> Error {
    Error::DatabaseError(sqlx::Error::Protocol(message.to_string()))
}

/// Whether `err` is the driver error built from `message`
pub fn is_driver_error(err: &Error, message: &str) -> bool {
    matches!(err, Error::DatabaseError(sqlx::Error::Protocol(m)) if m == message)
}

fn scripted(outcome: Option<Outcome>) -> Result<()> {
    match outcome.unwrap_or(Outcome::Ok) {
        Outcome::Ok => Ok(()),
        Outcome::Contention => Err(Error::Contention("database is locked".to_string())),
        Outcome::Fail(message) => Err(driver_error(&message)),
    }
}

#[async_trait]
impl SentinelStore for ScriptedSentinelStore {
    async fn create(&self) -> Result<SentinelRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.create_script.lock().unwrap().pop_front();
        scripted(outcome)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        self.live.lock().unwrap().push(id);
        Ok(SentinelRecord {
            id,
            holder: SentinelRecord::current_holder(),
            created_at: Utc::now(),
        })
    }

    async fn delete(&self, record: &SentinelRecord) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.delete_script.lock().unwrap().pop_front();
        scripted(outcome)?;

        let mut live = self.live.lock().unwrap();
        match live.iter().position(|id| *id == record.id) {
            Some(index) => {
                live.remove(index);
                Ok(())
            }
            None => Err(Error::ReleaseFailed(format!(
                "sentinel {} no longer exists",
                record.id
            ))),
        }
    }
}
