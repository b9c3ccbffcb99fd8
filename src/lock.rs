//! Cluster-wide single-flight lock for tick execution
//!
//! The lock is one row in the store keyed by a fixed id. Acquisition is a
//! conditional insert: whoever creates the row owns the tick. Rows carry a
//! TTL so a crashed holder never wedges the system; any instance may delete
//! an expired row and retry the insert exactly once.
//!
//! Acquisition fails closed: when the store cannot be reached the answer is
//! "busy", never "go ahead unlocked".

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::models::TickLock;
use crate::store::SharedStore;

/// Fixed key of the tick lock row
pub const TICK_LOCK_ID: &str = "autopilot:tick";

/// Single-flight mutex over the shared store
pub struct LockManager {
    store: SharedStore,
    lock_id: String,
}

impl LockManager {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            lock_id: TICK_LOCK_ID.to_string(),
        }
    }

    /// Lock id used by this manager
    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// Try to take the lock with the given lease duration
    ///
    /// Returns true only when this call created a fresh lock row. A held,
    /// unexpired lock and a store failure both report false.
    pub fn acquire(&self, ttl: Duration) -> bool {
        let now = Utc::now();
        let lock = TickLock::new(&self.lock_id, now, ttl);

        match self.store.try_insert_lock(&lock) {
            Ok(true) => {
                debug!(lock_id = %self.lock_id, expires_at = %lock.expires_at, "tick lock acquired");
                true
            }
            Ok(false) => self.reclaim_if_expired(&lock),
            Err(e) => {
                warn!(error = %e, "lock acquisition failed, treating as busy");
                false
            }
        }
    }

    /// Delete the lock row unconditionally
    ///
    /// Returns true when a row was removed. A missing row is logged but not
    /// an error; the holder may have expired and been reclaimed meanwhile.
    pub fn release(&self) -> bool {
        match self.store.delete_lock(&self.lock_id) {
            Ok(true) => {
                debug!(lock_id = %self.lock_id, "tick lock released");
                true
            }
            Ok(false) => {
                debug!(lock_id = %self.lock_id, "release found no lock row");
                false
            }
            Err(e) => {
                warn!(error = %e, "lock release failed");
                false
            }
        }
    }

    // Conflict path: inspect the holder, take over only a lapsed lease.
    fn reclaim_if_expired(&self, lock: &TickLock) -> bool {
        let holder = match self.store.get_lock(&self.lock_id) {
            Ok(holder) => holder,
            Err(e) => {
                warn!(error = %e, "could not read lock holder, treating as busy");
                return false;
            }
        };

        match holder {
            Some(held) if held.is_expired(lock.locked_at) => {
                info!(
                    lock_id = %self.lock_id,
                    locked_at = %held.locked_at,
                    expired_at = %held.expires_at,
                    "reclaiming expired tick lock"
                );
                if let Err(e) = self.store.delete_lock(&self.lock_id) {
                    warn!(error = %e, "could not delete expired lock");
                    return false;
                }
                // One retry only; losing the race to another reclaimer is a
                // normal busy outcome.
                match self.store.try_insert_lock(lock) {
                    Ok(won) => won,
                    Err(e) => {
                        warn!(error = %e, "lock re-insert failed after reclaim");
                        false
                    }
                }
            }
            Some(held) => {
                debug!(
                    lock_id = %self.lock_id,
                    expires_at = %held.expires_at,
                    "tick lock held by a live lease"
                );
                false
            }
            // The holder released between our insert and read. The expiry
            // path owns the single retry, so this call just reports busy.
            None => false,
        }
    }
}
