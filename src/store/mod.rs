//! Repository pattern for the autopilot persistence boundary
//!
//! This module provides a trait-based store abstraction to decouple the
//! scheduler from storage implementations, enabling:
//! - Easy testing with the in-memory implementation
//! - Swappable storage backends
//! - Clear separation of concerns
//!
//! The trait covers everything the autopilot touches: account scheduling and
//! health fields, caption/image selection queries, the append-only attempt
//! log, and the conditional-insert tick lock.
//!
//! # Usage
//!
//! ```rust,ignore
//! use postpilot::store::{open_sqlite_store, Store};
//!
//! // Production: SQLite
//! let store = open_sqlite_store("autopilot.db")?;
//!
//! // Testing: in-memory
//! let store = postpilot::store::create_memory_store();
//! ```

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{Account, Caption, ImageAsset, NewAttempt, PostAttempt, TickLock};

// ============================================================================
// Core Types
// ============================================================================

/// Errors raised at the persistence boundary
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// Row lookup that the caller requires to exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique-constraint violation (duplicate username and the like)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Connection contention, safe to retry
    #[error("Store busy")]
    Busy,

    /// Filesystem failure while opening the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Route SQLITE_BUSY and constraint failures to their own variants so callers
// can tell contention and duplicates apart from genuine database faults
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                Self::Busy
            }
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Conflict(
                    msg.clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                )
            }
            _ => Self::Database(err),
        }
    }
}

impl StoreError {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Create a not-found error for an account id
    pub fn account_not_found(id: i64) -> Self {
        Self::NotFound(format!("account {id}"))
    }
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Aggregate counts backing the status endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Accounts due at the query instant
    pub due_now: usize,
    /// Accounts becoming due within the next hour (excludes already due)
    pub due_next_hour: usize,
    /// Accounts with autopilot enabled
    pub enabled: usize,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence operations consumed by the autopilot
///
/// Implementations must be safe to share behind an `Arc` across the server
/// handlers and the tick pipeline.
pub trait Store: Send + Sync {
    // --- accounts ---

    /// Insert a new account with autopilot disabled and no schedule
    fn create_account(&self, username: &str, session_ref: Option<&str>) -> StoreResult<Account>;

    /// Fetch an account by id
    fn get_account(&self, id: i64) -> StoreResult<Option<Account>>;

    /// Fetch an account by username
    fn get_account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;

    /// List all accounts ordered by id
    fn list_accounts(&self) -> StoreResult<Vec<Account>>;

    /// Accounts due at `now`, ordered by `next_run_at`, truncated to `limit`
    ///
    /// Unscheduled accounts (`next_run_at` NULL) never appear.
    fn due_accounts(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Account>>;

    /// Turn autopilot on and schedule the first run
    fn enable_autopilot(
        &self,
        id: i64,
        cadence_minutes: i64,
        jitter_seconds: i64,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<Account>;

    /// Turn autopilot off and clear the schedule
    fn disable_autopilot(&self, id: i64) -> StoreResult<Account>;

    /// Apply the success transition: reset error fields, stamp the post,
    /// remember the caption, schedule the next run
    fn mark_post_success(
        &self,
        id: i64,
        caption_id: i64,
        posted_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Apply the failure transition: bump the error count, record the
    /// message, schedule the backoff run
    fn mark_post_failure(
        &self,
        id: i64,
        message: &str,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Replace the opaque session handle
    fn update_session_ref(&self, id: i64, session_ref: Option<&str>) -> StoreResult<()>;

    /// Counts backing the status endpoint, side-effect free
    fn scheduler_stats(&self, now: DateTime<Utc>) -> StoreResult<SchedulerStats>;

    // --- captions ---

    /// Insert a caption (unused)
    fn create_caption(&self, text: &str, category: Option<&str>) -> StoreResult<Caption>;

    /// Fetch a caption by id
    fn get_caption(&self, id: i64) -> StoreResult<Option<Caption>>;

    /// Random sample of unused captions, excluding one id, bounded by `limit`
    fn sample_unused_captions(
        &self,
        exclude: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<Caption>>;

    /// One uniformly random caption regardless of used state, excluding one
    /// id when given
    fn random_caption(&self, exclude: Option<i64>) -> StoreResult<Option<Caption>>;

    /// Flag a caption as published
    fn mark_caption_used(&self, id: i64) -> StoreResult<()>;

    // --- images ---

    /// Insert an image asset
    fn create_image(&self, url: &str) -> StoreResult<ImageAsset>;

    /// Fetch an image by id
    fn get_image(&self, id: i64) -> StoreResult<Option<ImageAsset>>;

    /// Random sample of image assets bounded by `limit`
    fn sample_images(&self, limit: usize) -> StoreResult<Vec<ImageAsset>>;

    /// Bump an image's selection counter
    fn increment_image_use(&self, id: i64) -> StoreResult<()>;

    // --- attempt log ---

    /// Append one attempt row and return it with id and timestamp
    fn record_attempt(&self, attempt: &NewAttempt) -> StoreResult<PostAttempt>;

    /// Most recent attempts for an account, newest first
    fn recent_attempts(&self, account_id: i64, limit: usize) -> StoreResult<Vec<PostAttempt>>;

    // --- tick lock ---

    /// Conditional insert of the lock row; false when the key already exists
    fn try_insert_lock(&self, lock: &TickLock) -> StoreResult<bool>;

    /// Read the current lock row
    fn get_lock(&self, id: &str) -> StoreResult<Option<TickLock>>;

    /// Delete the lock row; false when no row existed
    fn delete_lock(&self, id: &str) -> StoreResult<bool>;

    // --- provided lookups ---

    /// Fetch an account by id, raising `NotFound` when missing
    fn require_account(&self, id: i64) -> StoreResult<Account> {
        self.get_account(id)?
            .ok_or_else(|| StoreError::account_not_found(id))
    }

    /// Fetch an account by username, raising `NotFound` when missing
    fn require_account_by_username(&self, username: &str) -> StoreResult<Account> {
        self.get_account_by_username(username)?
            .ok_or_else(|| StoreError::NotFound(format!("account '{username}'")))
    }
}

// ============================================================================
// Shared Store Types
// ============================================================================

/// Thread-safe shared store handle
pub type SharedStore = Arc<dyn Store>;

/// Open a shared SQLite-backed store
pub fn open_sqlite_store(path: impl AsRef<Path>) -> StoreResult<SharedStore> {
    let store = SqliteStore::new(path)?;
    Ok(Arc::new(store))
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

// ============================================================================
// Tests
// ============================================================================
