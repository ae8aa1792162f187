//! Advisory lock behaviour against an in-process advisory engine

mod support;

use dblock_core::config::LockConfig;
use dblock_core::domain::locking::{DatabaseLock, LockState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use support::FakeAdvisoryServer;

#[tokio::test]
async fn test_same_key_blocks_until_holder_exits() {
    let server = FakeAdvisoryServer::new();
    let config = LockConfig::default();

    let mut lock_a = DatabaseLock::new(Box::new(server.session()), &config);
    let guard_a = lock_a.acquire().await.expect("A acquires");

    let a_released = Arc::new(AtomicBool::new(false));
    let a_released_seen = a_released.clone();
    let session_b = server.session();
    let b = tokio::spawn(async move {
        let mut lock_b = DatabaseLock::new(Box::new(session_b), &LockConfig::default());
        let guard_b = lock_b.acquire().await.expect("B acquires");
        assert!(a_released_seen.load(Ordering::SeqCst), "B entered while A held the lock");
        guard_b.release().await.expect("B releases");
        lock_b.state()
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!b.is_finished(), "B must block while A holds key 1");

    a_released.store(true, Ordering::SeqCst);
    guard_a.release().await.expect("A releases");
    assert_eq!(lock_a.state(), LockState::Released);

    let b_state = tokio::time::timeout(Duration::from_secs(5), b)
        .await
        .expect("B acquires after A exits")
        .unwrap();
    assert_eq!(b_state, LockState::Released);
}

#[tokio::test]
async fn test_distinct_keys_do_not_block() {
    let server = FakeAdvisoryServer::new();

    let mut lock_one = DatabaseLock::new(
        Box::new(server.session()),
        &LockConfig::default().with_task_lock_id(1),
    );
    let mut lock_two = DatabaseLock::new(
        Box::new(server.session()),
        &LockConfig::default().with_task_lock_id(2),
    );

    let guard_one = lock_one.acquire().await.unwrap();
    let guard_two = tokio::time::timeout(Duration::from_secs(1), lock_two.acquire())
        .await
        .expect("key 2 must not wait on key 1")
        .unwrap();

    guard_two.release().await.unwrap();
    guard_one.release().await.unwrap();
}

#[tokio::test]
async fn test_lock_and_unlock_run_on_one_session() {
    let server = FakeAdvisoryServer::new();
    let session = server.session();
    let statements = session.statements();

    let mut lock = DatabaseLock::new(Box::new(session), &LockConfig::default().with_task_lock_id(77));
    lock.run(|| async { Ok::<_, dblock_core::Error>(()) })
        .await
        .unwrap();

    assert_eq!(
        *statements.lock().unwrap(),
        vec![
            "SELECT pg_advisory_lock(77)".to_string(),
            "SELECT pg_advisory_unlock(77)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_run_releases_when_section_fails() {
    let server = FakeAdvisoryServer::new();

    let mut first = DatabaseLock::new(Box::new(server.session()), &LockConfig::default());
    let result: Result<(), dblock_core::Error> = first
        .run(|| async { Err(dblock_core::Error::Io(std::io::Error::other("task failed"))) })
        .await;
    assert!(result.is_err());

    // A second session can only get in if the failed section let go.
    let mut second = DatabaseLock::new(Box::new(server.session()), &LockConfig::default());
    let guard = tokio::time::timeout(Duration::from_secs(1), second.acquire())
        .await
        .expect("lock was released after the failing section")
        .unwrap();
    guard.release().await.unwrap();
}
