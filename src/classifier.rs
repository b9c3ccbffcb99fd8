//! Failure classification for posting and login errors
//!
//! Raw failure messages from the posting capability are matched against a
//! small keyword taxonomy. The resulting [`ErrorKind`] steers two separate
//! decisions:
//!
//! - the posting executor retries once when the first attempt classifies as
//!   [`ErrorKind::Transient`], and never otherwise
//! - the health state machine applies the per-kind cooldown from
//!   [`LoginPolicy`] when a login-stage failure is recorded
//!
//! Classification is ordered: kinds are checked in the sequence transient,
//! rate limit, shadowban, auth, network, and the first keyword hit wins.
//! "rate limit" therefore classifies as transient (and earns a same-tick
//! retry); the rate-limit kind is reached through its distinct markers such
//! as "429" or "too many requests".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy shared by the executor and the health machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Short-lived upstream hiccup, worth one immediate retry
    Transient,
    /// Platform throttling, long cooldown, never retried
    RateLimit,
    /// Reduced visibility penalty, longest cooldown, never retried
    Shadowban,
    /// Credentials or session rejected
    AuthError,
    /// Connectivity failure below the platform layer
    NetworkError,
    /// Anything the keyword lists do not cover
    Unknown,
}

impl ErrorKind {
    /// Get string representation for logs and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::RateLimit => "rate_limit",
            Self::Shadowban => "shadowban",
            Self::AuthError => "auth_error",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        }
    }

    /// All kinds in classification order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Transient,
            Self::RateLimit,
            Self::Shadowban,
            Self::AuthError,
            Self::NetworkError,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "502",
    "503",
    "504",
    "rate limit",
    "temporary",
    "server error",
    "session_error",
];

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "too many requests",
    "429",
    "quota exceeded",
    "temporary block",
    "try again later",
];

const SHADOWBAN_MARKERS: &[&str] = &[
    "shadowban",
    "content not visible",
    "post not appearing",
    "engagement reduced",
    "visibility limited",
];

const AUTH_MARKERS: &[&str] = &[
    "authentication",
    "login failed",
    "invalid credentials",
    "session expired",
    "token invalid",
];

const NETWORK_MARKERS: &[&str] = &["network", "connection", "timeout", "dns", "ssl"];

fn matches_any(message: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| message.contains(m))
}

/// Classify a failure message
///
/// Matching is case-insensitive substring search; the first kind whose
/// marker list hits wins.
pub fn classify(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();

    if matches_any(&msg, TRANSIENT_MARKERS) {
        ErrorKind::Transient
    } else if matches_any(&msg, RATE_LIMIT_MARKERS) {
        ErrorKind::RateLimit
    } else if matches_any(&msg, SHADOWBAN_MARKERS) {
        ErrorKind::Shadowban
    } else if matches_any(&msg, AUTH_MARKERS) {
        ErrorKind::AuthError
    } else if matches_any(&msg, NETWORK_MARKERS) {
        ErrorKind::NetworkError
    } else {
        ErrorKind::Unknown
    }
}

/// Check whether a failure message warrants the executor's single retry
pub fn is_transient(message: &str) -> bool {
    classify(message) == ErrorKind::Transient
}

/// Cooldown and retry budget applied to login-stage failures
///
/// The posting path never consults this table; it always follows the
/// single-transient-retry rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPolicy {
    /// Seconds the account sits out after a login-stage failure
    pub cooldown_secs: i64,
    /// Login attempts allowed beyond the first
    pub max_login_retries: u32,
}

impl LoginPolicy {
    /// Look up the policy for an error kind
    pub fn for_kind(kind: ErrorKind) -> Self {
        let (cooldown_secs, max_login_retries) = match kind {
            ErrorKind::RateLimit => (1800, 0),
            ErrorKind::Shadowban => (7200, 0),
            ErrorKind::AuthError => (300, 3),
            ErrorKind::NetworkError => (60, 5),
            ErrorKind::Unknown => (300, 2),
            ErrorKind::Transient => (60, 1),
        };
        Self {
            cooldown_secs,
            max_login_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transient() {
        assert_eq!(classify("Read timeout after 30s"), ErrorKind::Transient);
        assert_eq!(classify("upstream returned 503"), ErrorKind::Transient);
        assert_eq!(classify("session_error: please retry"), ErrorKind::Transient);
    }

    #[test]
    fn test_rate_limit_overlap_prefers_transient() {
        // "rate limit" appears in both marker lists; classification order
        // resolves it as transient
        assert_eq!(classify("rate limit hit"), ErrorKind::Transient);
        assert_eq!(classify("429 too many requests"), ErrorKind::RateLimit);
        assert_eq!(classify("quota exceeded for today"), ErrorKind::RateLimit);
        assert_eq!(classify("temporary block applied"), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_shadowban() {
        assert_eq!(classify("post not appearing in hashtag feeds"), ErrorKind::Shadowban);
        assert_eq!(classify("Visibility limited by platform"), ErrorKind::Shadowban);
    }

    #[test]
    fn test_classify_auth() {
        assert_eq!(classify("login failed: challenge required"), ErrorKind::AuthError);
        assert_eq!(classify("Invalid credentials provided"), ErrorKind::AuthError);
    }

    #[test]
    fn test_network_only_without_transient_markers() {
        // "network", "connection" and "timeout" are claimed by the transient
        // list first; dns and ssl are the reachable network markers
        assert_eq!(classify("dns resolution failed"), ErrorKind::NetworkError);
        assert_eq!(classify("SSL handshake aborted"), ErrorKind::NetworkError);
        assert_eq!(classify("network unreachable"), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify("something odd happened"), ErrorKind::Unknown);
        assert_eq!(classify(""), ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_case_insensitive() {
        assert_eq!(classify("TIMEOUT"), ErrorKind::Transient);
        assert_eq!(classify("Quota Exceeded"), ErrorKind::RateLimit);
    }

    #[test]
    fn test_is_transient() {
        assert!(is_transient("connection reset by peer"));
        assert!(!is_transient("login failed"));
        assert!(!is_transient("429"));
    }

    #[test]
    fn test_login_policy_table() {
        assert_eq!(
            LoginPolicy::for_kind(ErrorKind::RateLimit),
            LoginPolicy { cooldown_secs: 1800, max_login_retries: 0 }
        );
        assert_eq!(
            LoginPolicy::for_kind(ErrorKind::Shadowban),
            LoginPolicy { cooldown_secs: 7200, max_login_retries: 0 }
        );
        assert_eq!(
            LoginPolicy::for_kind(ErrorKind::AuthError),
            LoginPolicy { cooldown_secs: 300, max_login_retries: 3 }
        );
        assert_eq!(
            LoginPolicy::for_kind(ErrorKind::NetworkError),
            LoginPolicy { cooldown_secs: 60, max_login_retries: 5 }
        );
        assert_eq!(
            LoginPolicy::for_kind(ErrorKind::Unknown),
            LoginPolicy { cooldown_secs: 300, max_login_retries: 2 }
        );
    }

    #[test]
    fn test_kind_serde_representation() {
        let json = serde_json::to_string(&ErrorKind::AuthError).unwrap();
        assert_eq!(json, "\"auth_error\"");
    }

    #[test]
    fn test_all_kinds_have_policies() {
        for kind in ErrorKind::all() {
            let policy = LoginPolicy::for_kind(kind);
            assert!(policy.cooldown_secs > 0);
        }
    }
}
