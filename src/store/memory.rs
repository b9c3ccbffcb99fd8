//! In-memory store
//!
//! Useful for tests and ephemeral runs without database dependencies.
//! Semantics mirror the SQLite implementation, including the conditional
//! lock insert and the ordering of due accounts and attempt history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;

use crate::models::{Account, Caption, ImageAsset, NewAttempt, PostAttempt, TickLock};

use super::{SchedulerStats, Store, StoreError, StoreResult};

/// In-memory implementation of [`Store`]
pub struct MemoryStore {
    accounts: RwLock<HashMap<i64, Account>>,
    captions: RwLock<HashMap<i64, Caption>>,
    images: RwLock<HashMap<i64, ImageAsset>>,
    attempts: RwLock<Vec<PostAttempt>>,
    locks: RwLock<HashMap<String, TickLock>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            captions: RwLock::new(HashMap::new()),
            images: RwLock::new(HashMap::new()),
            attempts: RwLock::new(Vec::new()),
            locks: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Drop all state
    pub fn clear(&self) {
        self.accounts.write().unwrap().clear();
        self.captions.write().unwrap().clear();
        self.images.write().unwrap().clear();
        self.attempts.write().unwrap().clear();
        self.locks.write().unwrap().clear();
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn create_account(&self, username: &str, session_ref: Option<&str>) -> StoreResult<Account> {
        let account = Account {
            id: self.alloc_id(),
            username: username.to_string(),
            autopilot_enabled: false,
            cadence_minutes: 10,
            jitter_seconds: 60,
            next_run_at: None,
            last_posted_at: None,
            last_caption_id: None,
            error_count: 0,
            last_error: None,
            session_ref: session_ref.map(String::from),
            created_at: Utc::now(),
        };

        let mut accounts = self.accounts.write().unwrap();
        if accounts.values().any(|a| a.username == account.username) {
            return Err(StoreError::Conflict(format!(
                "username '{username}' already taken"
            )));
        }
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn get_account(&self, id: i64) -> StoreResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(&id).cloned())
    }

    fn get_account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.accounts.read().unwrap().values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    fn due_accounts(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Account>> {
        let mut due: Vec<Account> = self
            .accounts
            .read()
            .unwrap()
            .values()
            .filter(|a| a.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|a| (a.next_run_at, a.id));
        due.truncate(limit);
        Ok(due)
    }

    fn enable_autopilot(
        &self,
        id: i64,
        cadence_minutes: i64,
        jitter_seconds: i64,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::account_not_found(id))?;
        account.autopilot_enabled = true;
        account.cadence_minutes = cadence_minutes;
        account.jitter_seconds = jitter_seconds;
        account.next_run_at = Some(next_run_at);
        Ok(account.clone())
    }

    fn disable_autopilot(&self, id: i64) -> StoreResult<Account> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::account_not_found(id))?;
        account.autopilot_enabled = false;
        account.next_run_at = None;
        Ok(account.clone())
    }

    fn mark_post_success(
        &self,
        id: i64,
        caption_id: i64,
        posted_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::account_not_found(id))?;
        account.error_count = 0;
        account.last_error = None;
        account.last_posted_at = Some(posted_at);
        account.last_caption_id = Some(caption_id);
        account.next_run_at = Some(next_run_at);
        Ok(())
    }

    fn mark_post_failure(
        &self,
        id: i64,
        message: &str,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::account_not_found(id))?;
        account.error_count += 1;
        account.last_error = Some(message.to_string());
        account.next_run_at = Some(next_run_at);
        Ok(())
    }

    fn update_session_ref(&self, id: i64, session_ref: Option<&str>) -> StoreResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::account_not_found(id))?;
        account.session_ref = session_ref.map(String::from);
        Ok(())
    }

    fn scheduler_stats(&self, now: DateTime<Utc>) -> StoreResult<SchedulerStats> {
        let accounts = self.accounts.read().unwrap();
        let mut stats = SchedulerStats::default();

        for account in accounts.values() {
            if account.autopilot_enabled {
                stats.enabled += 1;
            }
            if account.is_due(now) {
                stats.due_now += 1;
            } else if account.is_due_within(now, Duration::hours(1)) {
                stats.due_next_hour += 1;
            }
        }

        Ok(stats)
    }

    fn create_caption(&self, text: &str, category: Option<&str>) -> StoreResult<Caption> {
        let caption = Caption {
            id: self.alloc_id(),
            text: text.to_string(),
            used: false,
            category: category.map(String::from),
            created_at: Utc::now(),
        };
        self.captions
            .write()
            .unwrap()
            .insert(caption.id, caption.clone());
        Ok(caption)
    }

    fn get_caption(&self, id: i64) -> StoreResult<Option<Caption>> {
        Ok(self.captions.read().unwrap().get(&id).cloned())
    }

    fn sample_unused_captions(
        &self,
        exclude: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<Caption>> {
        let captions = self.captions.read().unwrap();
        let candidates: Vec<&Caption> = captions
            .values()
            .filter(|c| !c.used && Some(c.id) != exclude)
            .collect();
        let mut rng = rand::thread_rng();
        Ok(candidates
            .choose_multiple(&mut rng, limit)
            .map(|c| (*c).clone())
            .collect())
    }

    fn random_caption(&self, exclude: Option<i64>) -> StoreResult<Option<Caption>> {
        let captions = self.captions.read().unwrap();
        let candidates: Vec<&Caption> = captions
            .values()
            .filter(|c| Some(c.id) != exclude)
            .collect();
        let mut rng = rand::thread_rng();
        Ok(candidates.choose(&mut rng).map(|c| (*c).clone()))
    }

    fn mark_caption_used(&self, id: i64) -> StoreResult<()> {
        let mut captions = self.captions.write().unwrap();
        let caption = captions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("caption {id}")))?;
        caption.used = true;
        Ok(())
    }

    fn create_image(&self, url: &str) -> StoreResult<ImageAsset> {
        let image = ImageAsset {
            id: self.alloc_id(),
            url: url.to_string(),
            use_count: 0,
            created_at: Utc::now(),
        };
        self.images.write().unwrap().insert(image.id, image.clone());
        Ok(image)
    }

    fn get_image(&self, id: i64) -> StoreResult<Option<ImageAsset>> {
        Ok(self.images.read().unwrap().get(&id).cloned())
    }

    fn sample_images(&self, limit: usize) -> StoreResult<Vec<ImageAsset>> {
        let images = self.images.read().unwrap();
        let candidates: Vec<&ImageAsset> = images.values().collect();
        let mut rng = rand::thread_rng();
        Ok(candidates
            .choose_multiple(&mut rng, limit)
            .map(|i| (*i).clone())
            .collect())
    }

    fn increment_image_use(&self, id: i64) -> StoreResult<()> {
        let mut images = self.images.write().unwrap();
        let image = images
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("image {id}")))?;
        image.use_count += 1;
        Ok(())
    }

    fn record_attempt(&self, attempt: &NewAttempt) -> StoreResult<PostAttempt> {
        let stored = PostAttempt {
            id: self.alloc_id(),
            account_id: attempt.account_id,
            caption_id: attempt.caption_id,
            image_id: attempt.image_id,
            success: attempt.success,
            message: attempt.message.clone(),
            created_at: Utc::now(),
        };
        self.attempts.write().unwrap().push(stored.clone());
        Ok(stored)
    }

    fn recent_attempts(&self, account_id: i64, limit: usize) -> StoreResult<Vec<PostAttempt>> {
        let attempts = self.attempts.read().unwrap();
        let mut recent: Vec<PostAttempt> = attempts
            .iter()
            .filter(|a| a.account_id == account_id)
            .cloned()
            .collect();
        recent.reverse();
        recent.truncate(limit);
        Ok(recent)
    }

    fn try_insert_lock(&self, lock: &TickLock) -> StoreResult<bool> {
        use std::collections::hash_map::Entry;

        let mut locks = self.locks.write().unwrap();
        match locks.entry(lock.id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(lock.clone());
                Ok(true)
            }
        }
    }

    fn get_lock(&self, id: &str) -> StoreResult<Option<TickLock>> {
        Ok(self.locks.read().unwrap().get(id).cloned())
    }

    fn delete_lock(&self, id: &str) -> StoreResult<bool> {
        Ok(self.locks.write().unwrap().remove(id).is_some())
    }
}
