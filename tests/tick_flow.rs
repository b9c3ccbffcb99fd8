//! Integration tests for the posting sweep
//!
//! These tests drive full ticks through the autopilot against the in-memory
//! store and verify:
//! - Content selection, publishing, and the success transition
//! - Per-kind backoff on publish and login failures
//! - Single-flight locking and stale lock recovery
//! - The per-tick account cap

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use postpilot::autopilot::{Autopilot, TickOutcome};
use postpilot::classifier::ErrorKind;
use postpilot::lock::TICK_LOCK_ID;
use postpilot::models::TickLock;
use postpilot::publisher::{PostOutcome, PostStage};
use postpilot::store::create_memory_store;

use common::{fast_scheduler_config, seed_content, seed_due_account, StubPublisher};

fn completed(outcome: TickOutcome) -> postpilot::autopilot::TickReport {
    match outcome {
        TickOutcome::Completed(report) => report,
        TickOutcome::Busy => panic!("tick was unexpectedly busy"),
    }
}

// ============================================================================
// Success Path
// ============================================================================

#[tokio::test]
async fn test_sweep_posts_for_due_account() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    let before = Utc::now();
    let report = completed(autopilot.run_tick().await.unwrap());

    assert_eq!(report.processed, 1);
    assert_eq!(report.successes, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(report.results[0].username, "aurora.daily");

    // Success transition: counters reset, post stamped, next run one
    // cadence out plus at most the jitter
    let updated = store.get_account(account.id).unwrap().unwrap();
    assert_eq!(updated.error_count, 0);
    assert!(updated.last_posted_at.is_some());
    assert!(updated.last_caption_id.is_some());

    let next = updated.next_run_at.unwrap();
    let min = before + Duration::minutes(30);
    let max = Utc::now() + Duration::minutes(30) + Duration::seconds(60);
    assert!(next >= min, "next run {next} before cadence floor {min}");
    assert!(next <= max, "next run {next} past jitter ceiling {max}");

    // The caption is burned and the image pick was counted
    let caption = store
        .get_caption(updated.last_caption_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(caption.used);
    let images = store.sample_images(10).unwrap();
    assert_eq!(images[0].use_count, 1);

    // One attempt in the audit trail
    let attempts = store.recent_attempts(account.id, 10).unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert_eq!(attempts[0].caption_id, Some(caption.id));
}

#[tokio::test]
async fn test_sweep_without_due_accounts_is_empty() {
    let store = create_memory_store();
    common::seed_idle_account(store.as_ref(), "dormant");
    seed_content(store.as_ref());

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    let report = completed(autopilot.run_tick().await.unwrap());
    assert_eq!(report.processed, 0);
    assert!(report.results.is_empty());
}

#[tokio::test]
async fn test_transient_publish_failure_retries_within_tick() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "flaky.feed");
    seed_content(store.as_ref());

    // First call hits a 503, the retry lands
    let publisher = StubPublisher::with_outcomes(vec![
        PostOutcome::failed(PostStage::Publish, "503 server error"),
        PostOutcome::posted("posted"),
    ]);
    let autopilot = Autopilot::new(store.clone(), Arc::new(publisher), &fast_scheduler_config());

    let report = completed(autopilot.run_tick().await.unwrap());
    assert_eq!(report.successes, 1);

    // Only the final outcome is recorded
    let attempts = store.recent_attempts(account.id, 10).unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
}

// ============================================================================
// Failure Transitions
// ============================================================================

#[tokio::test]
async fn test_publish_failure_backs_off_an_hour() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    let publisher = StubPublisher::with_outcomes(vec![PostOutcome::failed(
        PostStage::Publish,
        "caption rejected by platform",
    )]);
    let autopilot = Autopilot::new(store.clone(), Arc::new(publisher), &fast_scheduler_config());

    let before = Utc::now();
    let report = completed(autopilot.run_tick().await.unwrap());

    assert_eq!(report.failures, 1);
    assert_eq!(report.results[0].error_kind, Some(ErrorKind::Unknown));

    let updated = store.get_account(account.id).unwrap().unwrap();
    assert_eq!(updated.error_count, 1);
    assert_eq!(
        updated.last_error.as_deref(),
        Some("caption rejected by platform")
    );
    assert!(updated.last_posted_at.is_none());

    // Flat hour, no jitter
    let next = updated.next_run_at.unwrap();
    assert!(next >= before + Duration::seconds(3595));
    assert!(next <= Utc::now() + Duration::seconds(3605));
}

#[tokio::test]
async fn test_login_rate_limit_applies_long_cooldown() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    let publisher = StubPublisher::with_outcomes(vec![PostOutcome::failed(
        PostStage::Login,
        "too many requests",
    )]);
    let autopilot = Autopilot::new(store.clone(), Arc::new(publisher), &fast_scheduler_config());

    let before = Utc::now();
    let report = completed(autopilot.run_tick().await.unwrap());
    assert_eq!(report.results[0].error_kind, Some(ErrorKind::RateLimit));

    let updated = store.get_account(account.id).unwrap().unwrap();
    let next = updated.next_run_at.unwrap();
    assert!(next >= before + Duration::seconds(1795));
    assert!(next <= Utc::now() + Duration::seconds(1805));
}

#[tokio::test]
async fn test_shadowban_cooldown_is_two_hours() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    let publisher = StubPublisher::with_outcomes(vec![PostOutcome::failed(
        PostStage::Login,
        "shadowban suspected for account",
    )]);
    let autopilot = Autopilot::new(store.clone(), Arc::new(publisher), &fast_scheduler_config());

    let before = Utc::now();
    completed(autopilot.run_tick().await.unwrap());

    let updated = store.get_account(account.id).unwrap().unwrap();
    let next = updated.next_run_at.unwrap();
    assert!(next >= before + Duration::seconds(7195));
    assert!(next <= Utc::now() + Duration::seconds(7205));
}

#[tokio::test]
async fn test_no_caption_records_skip() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    // An image exists but no caption; the image must stay untouched
    store.create_image("https://cdn.example.com/1.jpg").unwrap();

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    let report = completed(autopilot.run_tick().await.unwrap());
    assert_eq!(report.failures, 1);
    assert_eq!(report.results[0].message, "no caption available");

    let attempts = store.recent_attempts(account.id, 10).unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].success);
    assert_eq!(attempts[0].caption_id, None);
    assert_eq!(attempts[0].image_id, None);

    let images = store.sample_images(10).unwrap();
    assert_eq!(images[0].use_count, 0);

    let updated = store.get_account(account.id).unwrap().unwrap();
    assert_eq!(updated.error_count, 1);
}

// ============================================================================
// Locking
// ============================================================================

#[tokio::test]
async fn test_busy_when_lock_held() {
    let store = create_memory_store();
    seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    let lock = TickLock::new(TICK_LOCK_ID, Utc::now(), Duration::seconds(120));
    assert!(store.try_insert_lock(&lock).unwrap());

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    match autopilot.run_tick().await.unwrap() {
        TickOutcome::Busy => {}
        TickOutcome::Completed(_) => panic!("tick ran despite a held lock"),
    }

    // Nothing was posted
    let accounts = store.list_accounts().unwrap();
    assert!(accounts[0].last_posted_at.is_none());
}

#[tokio::test]
async fn test_concurrent_ticks_admit_single_sweep() {
    use async_trait::async_trait;
    use postpilot::publisher::{PostRequest, Publisher};

    // Suspends mid-post so the rival tick runs while the lock is held
    struct YieldingPublisher;

    #[async_trait]
    impl Publisher for YieldingPublisher {
        async fn post(&self, _request: &PostRequest) -> PostOutcome {
            tokio::task::yield_now().await;
            PostOutcome::posted("posted")
        }

        async fn login(&self, _username: &str) -> PostOutcome {
            PostOutcome::posted("logged in")
        }
    }

    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    let first = Autopilot::new(
        store.clone(),
        Arc::new(YieldingPublisher),
        &fast_scheduler_config(),
    );
    let second = Autopilot::new(
        store.clone(),
        Arc::new(YieldingPublisher),
        &fast_scheduler_config(),
    );

    let (a, b) = tokio::join!(first.run_tick(), second.run_tick());
    let outcomes = [a.unwrap(), b.unwrap()];

    let wins = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::Completed(_)))
        .count();
    let busy = outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::Busy))
        .count();
    assert_eq!(wins, 1, "exactly one tick may hold the lock");
    assert_eq!(busy, 1);

    // The account was swept once, not twice
    let attempts = store.recent_attempts(account.id, 10).unwrap();
    assert_eq!(attempts.len(), 1);
}

#[tokio::test]
async fn test_stale_lock_is_reclaimed() {
    let store = create_memory_store();
    seed_due_account(store.as_ref(), "aurora.daily");
    seed_content(store.as_ref());

    // Leftover from a crashed tick, expired ten minutes ago
    let stale = TickLock::new(
        TICK_LOCK_ID,
        Utc::now() - Duration::minutes(12),
        Duration::seconds(120),
    );
    assert!(store.try_insert_lock(&stale).unwrap());

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    let report = completed(autopilot.run_tick().await.unwrap());
    assert_eq!(report.successes, 1);

    // The lock was released at the end of the sweep
    assert!(store.get_lock(TICK_LOCK_ID).unwrap().is_none());
}

// ============================================================================
// Sweep Shape
// ============================================================================

#[tokio::test]
async fn test_max_per_tick_caps_sweep() {
    let store = create_memory_store();
    seed_content(store.as_ref());
    store.create_caption("second caption", None).unwrap();
    store.create_caption("third caption", None).unwrap();

    // Three due accounts with distinct due times
    for (i, name) in ["first", "second", "third"].iter().enumerate() {
        let account = store.create_account(name, None).unwrap();
        store
            .enable_autopilot(
                account.id,
                30,
                0,
                Utc::now() - Duration::minutes(30 - i as i64),
            )
            .unwrap();
    }

    let mut config = fast_scheduler_config();
    config.max_per_tick = 2;
    let autopilot = Autopilot::new(store.clone(), Arc::new(StubPublisher::always_ok()), &config);

    let report = completed(autopilot.run_tick().await.unwrap());
    assert_eq!(report.processed, 2);

    // Oldest due first
    assert_eq!(report.results[0].username, "first");
    assert_eq!(report.results[1].username, "second");

    // The third account is still waiting for the next tick
    let third = store.get_account_by_username("third").unwrap().unwrap();
    assert!(third.last_posted_at.is_none());
    assert!(third.is_due(Utc::now()));
}

#[tokio::test]
async fn test_consecutive_sweeps_rotate_captions() {
    let store = create_memory_store();
    let account = seed_due_account(store.as_ref(), "aurora.daily");
    store.create_caption("caption one", None).unwrap();
    store.create_caption("caption two", None).unwrap();

    let autopilot = Autopilot::new(
        store.clone(),
        Arc::new(StubPublisher::always_ok()),
        &fast_scheduler_config(),
    );

    completed(autopilot.run_tick().await.unwrap());
    let first = store
        .get_account(account.id)
        .unwrap()
        .unwrap()
        .last_caption_id
        .unwrap();

    // Force the account due again and sweep once more
    store
        .enable_autopilot(account.id, 30, 0, Utc::now() - Duration::minutes(1))
        .unwrap();
    completed(autopilot.run_tick().await.unwrap());

    let second = store
        .get_account(account.id)
        .unwrap()
        .unwrap()
        .last_caption_id
        .unwrap();
    assert_ne!(first, second, "the same caption was posted twice in a row");
}
