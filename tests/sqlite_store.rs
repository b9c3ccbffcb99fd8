//! Integration tests for sweeps backed by a SQLite file
//!
//! The in-memory store keeps the scheduler tests fast; these tests make sure
//! the same flows hold when everything goes through a database on disk,
//! including state read back by a fresh process.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use postpilot::autopilot::{Autopilot, TickOutcome};
use postpilot::lock::TICK_LOCK_ID;
use postpilot::models::TickLock;
use postpilot::store::open_sqlite_store;

use common::{fast_scheduler_config, seed_content, seed_due_account, StubPublisher};

#[tokio::test]
async fn test_sweep_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.db");

    {
        let store = open_sqlite_store(&path).unwrap();
        seed_due_account(store.as_ref(), "aurora.daily");
        seed_content(store.as_ref());

        let autopilot = Autopilot::new(
            store.clone(),
            Arc::new(StubPublisher::always_ok()),
            &fast_scheduler_config(),
        );
        match autopilot.run_tick().await.unwrap() {
            TickOutcome::Completed(report) => assert_eq!(report.successes, 1),
            TickOutcome::Busy => panic!("tick was unexpectedly busy"),
        }
    }

    // A fresh handle sees the full transition
    let store = open_sqlite_store(&path).unwrap();
    let account = store
        .get_account_by_username("aurora.daily")
        .unwrap()
        .unwrap();
    assert_eq!(account.error_count, 0);
    assert!(account.last_posted_at.is_some());
    assert!(account.next_run_at.unwrap() > Utc::now());

    let caption = store.get_caption(account.last_caption_id.unwrap()).unwrap().unwrap();
    assert!(caption.used);

    let attempts = store.recent_attempts(account.id, 10).unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.db");
    let store = open_sqlite_store(&path).unwrap();

    let account = seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    // An old failure on record, then a successful sweep
    store
        .record_attempt(&postpilot::models::NewAttempt {
            account_id: account.id,
            caption_id: None,
            image_id: None,
            success: false,
            message: "no caption available".to_string(),
        })
        .unwrap();

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );
    autopilot.run_tick().await.unwrap();

    let attempts = store.recent_attempts(account.id, 10).unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].success, "newest attempt should come first");
    assert!(!attempts[1].success);

    // Limit trims from the old end
    let latest = store.recent_attempts(account.id, 1).unwrap();
    assert_eq!(latest.len(), 1);
    assert!(latest[0].success);
}

#[test]
fn test_lock_is_exclusive_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.db");

    let first = open_sqlite_store(&path).unwrap();
    let second = open_sqlite_store(&path).unwrap();

    let lock = TickLock::new(TICK_LOCK_ID, Utc::now(), Duration::seconds(120));
    assert!(first.try_insert_lock(&lock).unwrap());

    // The second handle cannot take the same lock
    assert!(!second.try_insert_lock(&lock).unwrap());

    // Release through one handle frees it for the other
    assert!(first.delete_lock(TICK_LOCK_ID).unwrap());
    assert!(second.try_insert_lock(&lock).unwrap());
}

#[tokio::test]
async fn test_two_autopilots_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.db");

    let store_a = open_sqlite_store(&path).unwrap();
    let store_b = open_sqlite_store(&path).unwrap();

    seed_due_account(store_a.as_ref(), "aurora.daily");
    seed_content(store_a.as_ref());

    let autopilot_a = Autopilot::new(
        store_a.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );
    let autopilot_b = Autopilot::new(
        store_b.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    // The first sweep posts; the second finds nothing due
    match autopilot_a.run_tick().await.unwrap() {
        TickOutcome::Completed(report) => assert_eq!(report.successes, 1),
        TickOutcome::Busy => panic!("tick was unexpectedly busy"),
    }
    match autopilot_b.run_tick().await.unwrap() {
        TickOutcome::Completed(report) => assert_eq!(report.processed, 0),
        TickOutcome::Busy => panic!("tick was unexpectedly busy"),
    }
}
