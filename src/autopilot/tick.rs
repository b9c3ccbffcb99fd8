//! Externally-triggered posting pass
//!
//! A tick is one bounded sweep over due accounts: the caller (HTTP endpoint,
//! CLI, cron hitting the endpoint) supplies the trigger, this module supplies
//! the semantics. One tick runs at a time, fleet-wide, enforced by the
//! conditional-insert lock; a tick that loses the race reports busy instead
//! of waiting.
//!
//! Per due account the pass picks content, drives the executor, appends the
//! attempt row, and applies exactly one health transition. Per-account
//! publish failures are normal outcomes and never abort the sweep; a store
//! failure mid-sweep does, because continuing without being able to record
//! state would double-post on the next trigger.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{self, ErrorKind};
use crate::config::SchedulerConfig;
use crate::content::ContentSelector;
use crate::error::{Error, Result};
use crate::lock::LockManager;
use crate::models::{Account, NewAttempt};
use crate::publisher::{PostExecutor, PostRequest, PostStage, SharedPublisher};
use crate::store::{SchedulerStats, SharedStore};

use super::health;

// ============================================================================
// Tick Reports
// ============================================================================

/// What one account got out of a tick
#[derive(Debug, Clone, Serialize)]
pub struct AccountTickResult {
    pub account_id: i64,
    pub username: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub next_run_at: DateTime<Utc>,
}

/// Summary of one completed tick
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub processed: usize,
    pub successes: usize,
    pub failures: usize,
    pub results: Vec<AccountTickResult>,
}

/// Result of a tick trigger
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// The sweep ran to completion
    Completed(TickReport),
    /// Another tick holds the lock
    Busy,
}

// ============================================================================
// Snapshot Reports
// ============================================================================

/// Per-account view in the status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub id: i64,
    pub username: String,
    pub autopilot_enabled: bool,
    pub health: crate::models::HealthState,
    pub error_count: u32,
    pub cadence_minutes: i64,
    pub jitter_seconds: i64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_posted_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&Account> for AccountStatus {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            autopilot_enabled: account.autopilot_enabled,
            health: account.health_state(),
            error_count: account.error_count,
            cadence_minutes: account.cadence_minutes,
            jitter_seconds: account.jitter_seconds,
            next_run_at: account.next_run_at,
            last_posted_at: account.last_posted_at,
            last_error: account.last_error.clone(),
        }
    }
}

/// Point-in-time scheduler snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub stats: SchedulerStats,
    pub accounts: Vec<AccountStatus>,
}

// ============================================================================
// Autopilot
// ============================================================================

/// The posting autopilot: tick sweeps plus account schedule management
pub struct Autopilot {
    store: SharedStore,
    executor: PostExecutor,
    content: ContentSelector,
    lock: LockManager,
    max_per_tick: usize,
    lock_ttl: chrono::Duration,
}

impl Autopilot {
    pub fn new(store: SharedStore, publisher: SharedPublisher, config: &SchedulerConfig) -> Self {
        let (retry_min, retry_max) = config.retry_window();
        Self {
            executor: PostExecutor::with_retry_window(publisher, retry_min, retry_max),
            content: ContentSelector::new(store.clone(), config.caption_sample_size),
            lock: LockManager::new(store.clone()),
            max_per_tick: config.max_per_tick,
            lock_ttl: config.lock_ttl(),
            store,
        }
    }

    /// Run one tick, or report busy when another tick holds the lock
    pub async fn run_tick(&self) -> Result<TickOutcome> {
        if !self.lock.acquire(self.lock_ttl) {
            info!("tick lock busy, another tick is running");
            return Ok(TickOutcome::Busy);
        }

        let outcome = self.tick_locked().await;

        // Release even when the sweep erred; the lock is a mutex, not a
        // record of the failure.
        if !self.lock.release() {
            warn!("tick lock was already gone at release");
        }

        outcome.map(TickOutcome::Completed)
    }

    // Internal: the sweep body, runs under the lock
    async fn tick_locked(&self) -> Result<TickReport> {
        let tick_id = Uuid::new_v4();
        let started_at = Utc::now();

        let due = self.store.due_accounts(started_at, self.max_per_tick)?;
        info!(%tick_id, due = due.len(), "tick started");

        let mut results = Vec::with_capacity(due.len());
        for account in &due {
            results.push(self.process_account(account).await?);
        }

        let successes = results.iter().filter(|r| r.success).count();
        let failures = results.len() - successes;
        info!(%tick_id, processed = results.len(), successes, failures, "tick finished");

        Ok(TickReport {
            tick_id,
            started_at,
            processed: results.len(),
            successes,
            failures,
            results,
        })
    }

    // Internal: post for one account and apply its health transition
    async fn process_account(&self, account: &Account) -> Result<AccountTickResult> {
        let Some(caption) = self.content.pick_caption(account)? else {
            return self.record_skip(account, "no caption available");
        };
        let image = self.content.pick_image()?;

        let request = PostRequest::new(account, &caption, image.as_ref());
        let outcome = self.executor.execute(&request).await;
        let now = Utc::now();

        self.store.record_attempt(&NewAttempt {
            account_id: account.id,
            caption_id: Some(caption.id),
            image_id: image.as_ref().map(|i| i.id),
            success: outcome.success,
            message: outcome.message.clone(),
        })?;

        if outcome.success {
            let next = health::next_run_after_success(
                now,
                account.cadence_minutes,
                account.jitter_seconds,
            );
            self.store.mark_caption_used(caption.id)?;
            self.store
                .mark_post_success(account.id, caption.id, now, next)?;
            info!(username = %account.username, caption_id = caption.id, next_run = %next, "posted");

            Ok(AccountTickResult {
                account_id: account.id,
                username: account.username.clone(),
                success: true,
                message: outcome.message,
                error_kind: None,
                next_run_at: next,
            })
        } else {
            let kind = classifier::classify(&outcome.message);
            let next = match outcome.stage {
                PostStage::Login => health::next_run_after_login_failure(now, kind),
                PostStage::Publish => health::next_run_after_failure(now),
            };
            self.store
                .mark_post_failure(account.id, &outcome.message, next)?;
            warn!(
                username = %account.username,
                kind = %kind,
                next_run = %next,
                error = %outcome.message,
                "post failed"
            );

            Ok(AccountTickResult {
                account_id: account.id,
                username: account.username.clone(),
                success: false,
                message: outcome.message,
                error_kind: Some(kind),
                next_run_at: next,
            })
        }
    }

    // Internal: content drought; log it and back the account off
    fn record_skip(&self, account: &Account, message: &str) -> Result<AccountTickResult> {
        let now = Utc::now();
        self.store.record_attempt(&NewAttempt {
            account_id: account.id,
            caption_id: None,
            image_id: None,
            success: false,
            message: message.to_string(),
        })?;

        let next = health::next_run_after_failure(now);
        self.store.mark_post_failure(account.id, message, next)?;
        warn!(username = %account.username, next_run = %next, "skipped: {message}");

        Ok(AccountTickResult {
            account_id: account.id,
            username: account.username.clone(),
            success: false,
            message: message.to_string(),
            error_kind: Some(classifier::classify(message)),
            next_run_at: next,
        })
    }

    /// Point-in-time snapshot for the status surface
    pub fn status(&self) -> Result<StatusReport> {
        let generated_at = Utc::now();
        let stats = self.store.scheduler_stats(generated_at)?;
        let accounts = self
            .store
            .list_accounts()?
            .iter()
            .map(AccountStatus::from)
            .collect();

        Ok(StatusReport {
            generated_at,
            stats,
            accounts,
        })
    }

    /// Turn autopilot on for an account
    ///
    /// Overrides replace the stored cadence and jitter; the first run lands
    /// exactly one cadence out, without jitter. A cadence below one minute
    /// or a negative jitter would schedule the account at or before now,
    /// so both are rejected before anything is written.
    pub fn enable_account(
        &self,
        id: i64,
        cadence_minutes: Option<i64>,
        jitter_seconds: Option<i64>,
    ) -> Result<Account> {
        let account = self.store.require_account(id)?;
        let cadence = cadence_minutes.unwrap_or(account.cadence_minutes);
        let jitter = jitter_seconds.unwrap_or(account.jitter_seconds);

        if cadence < 1 {
            return Err(Error::config(format!(
                "cadence_minutes must be at least 1, got {cadence}"
            )));
        }
        if jitter < 0 {
            return Err(Error::config(format!(
                "jitter_seconds must not be negative, got {jitter}"
            )));
        }

        let next = health::next_run_on_enable(Utc::now(), cadence);
        let updated = self.store.enable_autopilot(id, cadence, jitter, next)?;
        info!(username = %updated.username, cadence, jitter, next_run = %next, "autopilot enabled");
        Ok(updated)
    }

    /// Turn autopilot off for an account, clearing its schedule
    pub fn disable_account(&self, id: i64) -> Result<Account> {
        let updated = self.store.disable_autopilot(id)?;
        info!(username = %updated.username, "autopilot disabled");
        Ok(updated)
    }
}

// ============================================================================
// Tests
// ============================================================================
