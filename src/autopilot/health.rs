//! Scheduling transitions of the account health machine
//!
//! Every post attempt ends in exactly one transition, and each transition
//! pins down the account's next wake-up:
//!
//! - success: error count resets, next run lands cadence ahead plus a
//!   uniform jitter so accounts drift apart over time
//! - publish-stage failure: flat one-hour backoff, no jitter
//! - login-stage failure: the cooldown for the failure's classified kind
//!
//! Enabling autopilot schedules the first run exactly one cadence out,
//! without jitter, so operators can predict when it fires.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::classifier::{ErrorKind, LoginPolicy};

/// Flat reschedule distance after a publish-stage failure, seconds
pub const FAILURE_BACKOFF_SECS: i64 = 3600;

/// Next run after a successful post
///
/// Uniform jitter in `0..=jitter_seconds` is added on top of the cadence;
/// zero jitter keeps the schedule exact.
pub fn next_run_after_success(
    now: DateTime<Utc>,
    cadence_minutes: i64,
    jitter_seconds: i64,
) -> DateTime<Utc> {
    let jitter = if jitter_seconds > 0 {
        rand::thread_rng().gen_range(0..=jitter_seconds)
    } else {
        0
    };
    now + Duration::seconds(cadence_minutes * 60 + jitter)
}

/// Next run after a publish-stage failure
pub fn next_run_after_failure(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(FAILURE_BACKOFF_SECS)
}

/// Next run after a login-stage failure, per the kind's cooldown
pub fn next_run_after_login_failure(now: DateTime<Utc>, kind: ErrorKind) -> DateTime<Utc> {
    now + Duration::seconds(LoginPolicy::for_kind(kind).cooldown_secs)
}

/// First run when autopilot is switched on
pub fn next_run_on_enable(now: DateTime<Utc>, cadence_minutes: i64) -> DateTime<Utc> {
    now + Duration::minutes(cadence_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_success_without_jitter_is_exact() {
        let t = now();
        let next = next_run_after_success(t, 10, 0);
        assert_eq!(next, t + Duration::seconds(600));
    }

    #[test]
    fn test_success_jitter_stays_in_window() {
        let t = now();
        for _ in 0..200 {
            let next = next_run_after_success(t, 10, 60);
            assert!(next >= t + Duration::seconds(600));
            assert!(next <= t + Duration::seconds(660));
        }
    }

    #[test]
    fn test_failure_backoff_is_flat_hour() {
        let t = now();
        assert_eq!(next_run_after_failure(t), t + Duration::seconds(3600));
    }

    #[test]
    fn test_login_failure_uses_kind_cooldown() {
        let t = now();
        assert_eq!(
            next_run_after_login_failure(t, ErrorKind::RateLimit),
            t + Duration::seconds(1800)
        );
        assert_eq!(
            next_run_after_login_failure(t, ErrorKind::Shadowban),
            t + Duration::seconds(7200)
        );
        assert_eq!(
            next_run_after_login_failure(t, ErrorKind::AuthError),
            t + Duration::seconds(300)
        );
        assert_eq!(
            next_run_after_login_failure(t, ErrorKind::NetworkError),
            t + Duration::seconds(60)
        );
    }

    #[test]
    fn test_enable_has_no_jitter() {
        let t = now();
        for _ in 0..50 {
            assert_eq!(next_run_on_enable(t, 15), t + Duration::minutes(15));
        }
    }

    proptest! {
        #[test]
        fn prop_success_window_holds(cadence in 1i64..=1440, jitter in 0i64..=600) {
            let t = Utc::now();
            let next = next_run_after_success(t, cadence, jitter);
            let lower = t + Duration::seconds(cadence * 60);
            let upper = lower + Duration::seconds(jitter);
            prop_assert!(next >= lower);
            prop_assert!(next <= upper);
        }
    }
}
