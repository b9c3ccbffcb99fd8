// Core data structures for the postpilot autopilot

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{self, ErrorKind};

/// Managed social media account with scheduling and health state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    /// Whether the autopilot may post on behalf of this account
    pub autopilot_enabled: bool,
    /// Base posting interval in minutes
    pub cadence_minutes: i64,
    /// Upper bound of the random spread added on top of the cadence
    pub jitter_seconds: i64,
    /// Next scheduled run; `None` means not scheduled (never picked up)
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_posted_at: Option<DateTime<Utc>>,
    /// Caption used by the most recent successful post, excluded from the
    /// next selection round
    pub last_caption_id: Option<i64>,
    /// Consecutive failures since the last successful post
    pub error_count: u32,
    pub last_error: Option<String>,
    /// Opaque session handle resolved by the posting capability
    pub session_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Check whether this account is due at `now`
    ///
    /// Unscheduled accounts (`next_run_at = None`) are never due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.autopilot_enabled && self.next_run_at.is_some_and(|t| t <= now)
    }

    /// Check whether this account becomes due within `horizon` from `now`
    pub fn is_due_within(&self, now: DateTime<Utc>, horizon: Duration) -> bool {
        self.autopilot_enabled && self.next_run_at.is_some_and(|t| t <= now + horizon)
    }

    /// Derive the presentation health state from the stored error fields
    pub fn health_state(&self) -> HealthState {
        if self.error_count == 0 {
            return HealthState::Healthy;
        }
        match self.last_error.as_deref().map(classifier::classify) {
            Some(ErrorKind::RateLimit) => HealthState::RateLimited,
            Some(ErrorKind::Shadowban) => HealthState::Shadowbanned,
            _ => HealthState::Cooling,
        }
    }
}

/// Derived account health, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Cooling,
    RateLimited,
    Shadowbanned,
}

impl HealthState {
    /// Get string representation for logs and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Cooling => "cooling",
            Self::RateLimited => "rate_limited",
            Self::Shadowbanned => "shadowbanned",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Post caption text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caption {
    pub id: i64,
    pub text: String,
    /// Set once the caption has been published successfully
    pub used: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reusable image asset referenced by URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: i64,
    pub url: String,
    /// Incremented on every selection, regardless of post outcome
    pub use_count: i64,
    pub created_at: DateTime<Utc>,
}

/// One posting attempt, successful or not (append-only audit trail)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAttempt {
    pub id: i64,
    pub account_id: i64,
    /// `None` when no caption was available for the attempt
    pub caption_id: Option<i64>,
    pub image_id: Option<i64>,
    pub success: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Insert shape for [`PostAttempt`]
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub account_id: i64,
    pub caption_id: Option<i64>,
    pub image_id: Option<i64>,
    pub success: bool,
    pub message: String,
}

/// Single-flight tick lock row
///
/// At most one row exists per lock id; the conditional insert in the store
/// enforces this. A row past `expires_at` is reclaimable by any instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickLock {
    pub id: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TickLock {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: id.into(),
            locked_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check whether the holder's lease has lapsed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
