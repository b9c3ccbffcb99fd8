//! Common test utilities

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use postpilot::models::Account;
use postpilot::publisher::{PostOutcome, PostRequest, PostStage, Publisher};
use postpilot::store::Store;

/// Create an enabled account that is already due
pub fn seed_due_account(store: &dyn Store, username: &str) -> Account {
    let account = store.create_account(username, Some("blob-ref")).unwrap();
    store
        .enable_autopilot(account.id, 30, 60, Utc::now() - Duration::minutes(5))
        .unwrap()
}

/// Create an account with autopilot left off
#[allow(dead_code)]
pub fn seed_idle_account(store: &dyn Store, username: &str) -> Account {
    store.create_account(username, None).unwrap()
}

/// Seed one caption and one image so a sweep has content to pick
pub fn seed_content(store: &dyn Store) {
    store.create_caption("morning light", Some("scenery")).unwrap();
    store.create_image("https://cdn.example.com/1.jpg").unwrap();
}

/// Publisher that replays a scripted list of outcomes, then succeeds
pub struct StubPublisher {
    outcomes: Mutex<Vec<PostOutcome>>,
}

impl StubPublisher {
    pub fn always_ok() -> Self {
        Self::with_outcomes(vec![])
    }

    pub fn with_outcomes(mut outcomes: Vec<PostOutcome>) -> Self {
        // pop() consumes from the back
        outcomes.reverse();
        Self {
            outcomes: Mutex::new(outcomes),
        }
    }

    fn next(&self) -> PostOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| PostOutcome::posted("posted"))
    }
}

#[async_trait]
impl Publisher for StubPublisher {
    async fn post(&self, _request: &PostRequest) -> PostOutcome {
        self.next()
    }

    async fn login(&self, _username: &str) -> PostOutcome {
        self.next()
    }
}

/// Scheduler settings tuned for tests: no retry sleep worth noticing
#[allow(dead_code)]
pub fn fast_scheduler_config() -> postpilot::config::SchedulerConfig {
    let mut scheduler = postpilot::config::Config::default().scheduler;
    scheduler.retry_delay_min_secs = 0;
    scheduler.retry_delay_max_secs = 0;
    scheduler
}

#[allow(dead_code)]
pub fn stage_failure(stage: PostStage, message: &str) -> PostOutcome {
    PostOutcome::failed(stage, message)
}
