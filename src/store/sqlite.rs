//! SQLite-backed store
//!
//! Single connection guarded by a `Mutex`, WAL mode for concurrent readers.
//! Timestamps are stored as RFC 3339 TEXT; all writes go through the same
//! formatting path, so lexicographic comparison in SQL matches chronological
//! order.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Account, Caption, ImageAsset, NewAttempt, PostAttempt, TickLock};

use super::{SchedulerStats, Store, StoreError, StoreResult};

/// SQLite implementation of [`Store`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    autopilot_enabled INTEGER NOT NULL DEFAULT 0,
                    cadence_minutes INTEGER NOT NULL DEFAULT 10,
                    jitter_seconds INTEGER NOT NULL DEFAULT 60,
                    next_run_at TEXT,
                    last_posted_at TEXT,
                    last_caption_id INTEGER,
                    error_count INTEGER NOT NULL DEFAULT 0,
                    last_error TEXT,
                    session_ref TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_accounts_next_run
                    ON accounts(autopilot_enabled, next_run_at);

                CREATE TABLE IF NOT EXISTS captions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    text TEXT NOT NULL,
                    used INTEGER NOT NULL DEFAULT 0,
                    category TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_captions_used
                    ON captions(used);

                CREATE TABLE IF NOT EXISTS images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL,
                    use_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS post_attempts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    account_id INTEGER NOT NULL REFERENCES accounts(id),
                    caption_id INTEGER,
                    image_id INTEGER,
                    success INTEGER NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_attempts_account
                    ON post_attempts(account_id, created_at);

                CREATE TABLE IF NOT EXISTS tick_locks (
                    id TEXT PRIMARY KEY,
                    locked_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );
                "#,
        )?;

        Ok(())
    }

    fn fetch_account(conn: &Connection, id: i64) -> StoreResult<Option<Account>> {
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }
}

const ACCOUNT_COLUMNS: &str = "id, username, autopilot_enabled, cadence_minutes, jitter_seconds, \
     next_run_at, last_posted_at, last_caption_id, error_count, last_error, session_ref, created_at";

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        autopilot_enabled: row.get(2)?,
        cadence_minutes: row.get(3)?,
        jitter_seconds: row.get(4)?,
        next_run_at: row.get::<_, Option<String>>(5)?.map(|v| parse_ts(&v)),
        last_posted_at: row.get::<_, Option<String>>(6)?.map(|v| parse_ts(&v)),
        last_caption_id: row.get(7)?,
        error_count: row.get(8)?,
        last_error: row.get(9)?,
        session_ref: row.get(10)?,
        created_at: parse_ts(&row.get::<_, String>(11)?),
    })
}

fn caption_from_row(row: &Row<'_>) -> rusqlite::Result<Caption> {
    Ok(Caption {
        id: row.get(0)?,
        text: row.get(1)?,
        used: row.get(2)?,
        category: row.get(3)?,
        created_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageAsset> {
    Ok(ImageAsset {
        id: row.get(0)?,
        url: row.get(1)?,
        use_count: row.get(2)?,
        created_at: parse_ts(&row.get::<_, String>(3)?),
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<PostAttempt> {
    Ok(PostAttempt {
        id: row.get(0)?,
        account_id: row.get(1)?,
        caption_id: row.get(2)?,
        image_id: row.get(3)?,
        success: row.get(4)?,
        message: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

impl Store for SqliteStore {
    fn create_account(&self, username: &str, session_ref: Option<&str>) -> StoreResult<Account> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO accounts (username, session_ref, created_at) VALUES (?1, ?2, ?3)",
            params![username, session_ref, now],
        )?;

        let id = conn.last_insert_rowid();
        Self::fetch_account(&conn, id)?.ok_or_else(|| StoreError::account_not_found(id))
    }

    fn get_account(&self, id: i64) -> StoreResult<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        Self::fetch_account(&conn, id)
    }

    fn get_account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let conn = self.conn.lock().unwrap();
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?1"),
                params![username],
                account_from_row,
            )
            .optional()?;
        Ok(account)
    }

    fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"))?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    fn due_accounts(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Account>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE autopilot_enabled = 1
               AND next_run_at IS NOT NULL
               AND next_run_at <= ?1
             ORDER BY next_run_at
             LIMIT ?2"
        ))?;
        let accounts = stmt
            .query_map(params![now.to_rfc3339(), limit as i64], account_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(accounts)
    }

    fn enable_autopilot(
        &self,
        id: i64,
        cadence_minutes: i64,
        jitter_seconds: i64,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<Account> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts
             SET autopilot_enabled = 1, cadence_minutes = ?2, jitter_seconds = ?3, next_run_at = ?4
             WHERE id = ?1",
            params![id, cadence_minutes, jitter_seconds, next_run_at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::account_not_found(id));
        }
        Self::fetch_account(&conn, id)?.ok_or_else(|| StoreError::account_not_found(id))
    }

    fn disable_autopilot(&self, id: i64) -> StoreResult<Account> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts SET autopilot_enabled = 0, next_run_at = NULL WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StoreError::account_not_found(id));
        }
        Self::fetch_account(&conn, id)?.ok_or_else(|| StoreError::account_not_found(id))
    }

    fn mark_post_success(
        &self,
        id: i64,
        caption_id: i64,
        posted_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts
             SET error_count = 0,
                 last_error = NULL,
                 last_posted_at = ?2,
                 last_caption_id = ?3,
                 next_run_at = ?4
             WHERE id = ?1",
            params![
                id,
                posted_at.to_rfc3339(),
                caption_id,
                next_run_at.to_rfc3339()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::account_not_found(id));
        }
        Ok(())
    }

    fn mark_post_failure(
        &self,
        id: i64,
        message: &str,
        next_run_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts
             SET error_count = error_count + 1,
                 last_error = ?2,
                 next_run_at = ?3
             WHERE id = ?1",
            params![id, message, next_run_at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(StoreError::account_not_found(id));
        }
        Ok(())
    }

    fn update_session_ref(&self, id: i64, session_ref: Option<&str>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE accounts SET session_ref = ?2 WHERE id = ?1",
            params![id, session_ref],
        )?;
        if changed == 0 {
            return Err(StoreError::account_not_found(id));
        }
        Ok(())
    }

    fn scheduler_stats(&self, now: DateTime<Utc>) -> StoreResult<SchedulerStats> {
        let conn = self.conn.lock().unwrap();
        let now_str = now.to_rfc3339();
        let horizon = (now + Duration::hours(1)).to_rfc3339();

        let due_now: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accounts
             WHERE autopilot_enabled = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?1",
            params![now_str],
            |row| row.get(0),
        )?;

        let due_next_hour: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accounts
             WHERE autopilot_enabled = 1
               AND next_run_at IS NOT NULL
               AND next_run_at > ?1
               AND next_run_at <= ?2",
            params![now_str, horizon],
            |row| row.get(0),
        )?;

        let enabled: i64 = conn.query_row(
            "SELECT COUNT(*) FROM accounts WHERE autopilot_enabled = 1",
            [],
            |row| row.get(0),
        )?;

        Ok(SchedulerStats {
            due_now: due_now as usize,
            due_next_hour: due_next_hour as usize,
            enabled: enabled as usize,
        })
    }

    fn create_caption(&self, text: &str, category: Option<&str>) -> StoreResult<Caption> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO captions (text, category, created_at) VALUES (?1, ?2, ?3)",
            params![text, category, now],
        )?;

        let id = conn.last_insert_rowid();
        let caption = conn.query_row(
            "SELECT id, text, used, category, created_at FROM captions WHERE id = ?1",
            params![id],
            caption_from_row,
        )?;
        Ok(caption)
    }

    fn get_caption(&self, id: i64) -> StoreResult<Option<Caption>> {
        let conn = self.conn.lock().unwrap();
        let caption = conn
            .query_row(
                "SELECT id, text, used, category, created_at FROM captions WHERE id = ?1",
                params![id],
                caption_from_row,
            )
            .optional()?;
        Ok(caption)
    }

    fn sample_unused_captions(
        &self,
        exclude: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<Caption>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, text, used, category, created_at FROM captions
             WHERE used = 0 AND (?1 IS NULL OR id != ?1)
             ORDER BY RANDOM()
             LIMIT ?2",
        )?;
        let captions = stmt
            .query_map(params![exclude, limit as i64], caption_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(captions)
    }

    fn random_caption(&self, exclude: Option<i64>) -> StoreResult<Option<Caption>> {
        let conn = self.conn.lock().unwrap();
        let caption = conn
            .query_row(
                "SELECT id, text, used, category, created_at FROM captions
                 WHERE (?1 IS NULL OR id != ?1)
                 ORDER BY RANDOM()
                 LIMIT 1",
                params![exclude],
                caption_from_row,
            )
            .optional()?;
        Ok(caption)
    }

    fn mark_caption_used(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE captions SET used = 1 WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("caption {id}")));
        }
        Ok(())
    }

    fn create_image(&self, url: &str) -> StoreResult<ImageAsset> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO images (url, created_at) VALUES (?1, ?2)",
            params![url, now],
        )?;

        let id = conn.last_insert_rowid();
        let image = conn.query_row(
            "SELECT id, url, use_count, created_at FROM images WHERE id = ?1",
            params![id],
            image_from_row,
        )?;
        Ok(image)
    }

    fn get_image(&self, id: i64) -> StoreResult<Option<ImageAsset>> {
        let conn = self.conn.lock().unwrap();
        let image = conn
            .query_row(
                "SELECT id, url, use_count, created_at FROM images WHERE id = ?1",
                params![id],
                image_from_row,
            )
            .optional()?;
        Ok(image)
    }

    fn sample_images(&self, limit: usize) -> StoreResult<Vec<ImageAsset>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, url, use_count, created_at FROM images ORDER BY RANDOM() LIMIT ?1",
        )?;
        let images = stmt
            .query_map(params![limit as i64], image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    fn increment_image_use(&self, id: i64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE images SET use_count = use_count + 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("image {id}")));
        }
        Ok(())
    }

    fn record_attempt(&self, attempt: &NewAttempt) -> StoreResult<PostAttempt> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO post_attempts (account_id, caption_id, image_id, success, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attempt.account_id,
                attempt.caption_id,
                attempt.image_id,
                attempt.success,
                attempt.message,
                now
            ],
        )?;

        let id = conn.last_insert_rowid();
        let stored = conn.query_row(
            "SELECT id, account_id, caption_id, image_id, success, message, created_at
             FROM post_attempts WHERE id = ?1",
            params![id],
            attempt_from_row,
        )?;
        Ok(stored)
    }

    fn recent_attempts(&self, account_id: i64, limit: usize) -> StoreResult<Vec<PostAttempt>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, account_id, caption_id, image_id, success, message, created_at
             FROM post_attempts
             WHERE account_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let attempts = stmt
            .query_map(params![account_id, limit as i64], attempt_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(attempts)
    }

    fn try_insert_lock(&self, lock: &TickLock) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tick_locks (id, locked_at, expires_at) VALUES (?1, ?2, ?3)",
            params![
                lock.id,
                lock.locked_at.to_rfc3339(),
                lock.expires_at.to_rfc3339()
            ],
        )?;
        Ok(inserted == 1)
    }

    fn get_lock(&self, id: &str) -> StoreResult<Option<TickLock>> {
        let conn = self.conn.lock().unwrap();
        let lock = conn
            .query_row(
                "SELECT id, locked_at, expires_at FROM tick_locks WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TickLock {
                        id: row.get(0)?,
                        locked_at: parse_ts(&row.get::<_, String>(1)?),
                        expires_at: parse_ts(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;
        Ok(lock)
    }

    fn delete_lock(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM tick_locks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}
