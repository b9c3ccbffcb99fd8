//! Session establishment with per-kind retry budgets
//!
//! The post path gets exactly one transient retry; logging in is different.
//! How many times a login is worth retrying depends on what went wrong:
//! a wrong password never fixes itself, a flaky network often does within a
//! few attempts, and hammering a rate limiter only digs the hole deeper.
//! The budget comes from [`LoginPolicy::for_kind`] on the first failure's
//! classification, and the pause between attempts doubles from a base,
//! capped after three doublings.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::classifier::{self, ErrorKind, LoginPolicy};
use crate::publisher::{PostOutcome, SharedPublisher};

const DEFAULT_BASE_DELAY_SECS: u64 = 10;

/// Backoff stops growing after `base * 2^3`
const MAX_DOUBLINGS: u32 = 3;

/// What a login run produced
#[derive(Debug, Clone)]
pub struct LoginReport {
    pub outcome: PostOutcome,
    /// Total invocations, first attempt included
    pub attempts: u32,
    /// Classification of the final failure, `None` on success
    pub kind: Option<ErrorKind>,
}

impl LoginReport {
    /// Policy matching the final failure, for callers applying a cooldown
    pub fn policy(&self) -> Option<LoginPolicy> {
        self.kind.map(LoginPolicy::for_kind)
    }
}

/// Runs logins under the per-kind policy
pub struct LoginFlow {
    publisher: SharedPublisher,
    base_delay: Duration,
}

impl LoginFlow {
    pub fn new(publisher: SharedPublisher) -> Self {
        Self::with_base_delay(publisher, Duration::from_secs(DEFAULT_BASE_DELAY_SECS))
    }

    pub fn with_base_delay(publisher: SharedPublisher, base_delay: Duration) -> Self {
        Self {
            publisher,
            base_delay,
        }
    }

    /// Attempt a login, retrying up to the budget for the failure's kind.
    ///
    /// The budget is fixed by the first failure's classification; the
    /// reported kind reflects whatever error ended the run.
    pub async fn login_with_policy(&self, username: &str) -> LoginReport {
        let mut last = self.publisher.login(username).await;
        let mut attempts = 1u32;

        if !last.success {
            let kind = classifier::classify(&last.message);
            let policy = LoginPolicy::for_kind(kind);

            for retry in 1..=policy.max_login_retries {
                let delay = self.backoff_delay(retry);
                warn!(
                    username,
                    kind = %kind,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    error = %last.message,
                    "login failed, backing off before retry"
                );
                sleep(delay).await;

                last = self.publisher.login(username).await;
                attempts += 1;
                if last.success {
                    info!(username, attempts, "login succeeded after retry");
                    break;
                }
            }
        }

        let kind = if last.success {
            None
        } else {
            Some(classifier::classify(&last.message))
        };
        LoginReport {
            outcome: last,
            attempts,
            kind,
        }
    }

    fn backoff_delay(&self, retry: u32) -> Duration {
        let doublings = (retry.saturating_sub(1)).min(MAX_DOUBLINGS);
        self.base_delay * 2u32.pow(doublings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{PostRequest, PostStage, Publisher};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedLogin {
        script: Mutex<VecDeque<PostOutcome>>,
        calls: AtomicU32,
    }

    impl ScriptedLogin {
        fn new(outcomes: Vec<PostOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(outcomes.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn repeating(message: &str, times: usize) -> Arc<Self> {
            Self::new(vec![
                PostOutcome::failed(PostStage::Login, message);
                times
            ])
        }
    }

    #[async_trait]
    impl Publisher for ScriptedLogin {
        async fn post(&self, _request: &PostRequest) -> PostOutcome {
            PostOutcome::failed(PostStage::Publish, "post not scripted")
        }

        async fn login(&self, _username: &str) -> PostOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| PostOutcome::failed(PostStage::Login, "script exhausted"))
        }
    }

    fn fast_flow(publisher: Arc<ScriptedLogin>) -> LoginFlow {
        LoginFlow::with_base_delay(publisher, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_immediate_success_single_attempt() {
        let publisher = ScriptedLogin::new(vec![PostOutcome {
            success: true,
            message: "logged in".to_string(),
            stage: PostStage::Login,
        }]);
        let flow = fast_flow(publisher.clone());

        let report = flow.login_with_policy("aurora").await;
        assert!(report.outcome.success);
        assert_eq!(report.attempts, 1);
        assert!(report.kind.is_none());
        assert_eq!(publisher.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_never_retried() {
        let publisher = ScriptedLogin::repeating("429 too many requests", 5);
        let flow = fast_flow(publisher.clone());

        let report = flow.login_with_policy("aurora").await;
        assert!(!report.outcome.success);
        assert_eq!(report.attempts, 1);
        assert_eq!(report.kind, Some(ErrorKind::RateLimit));
        assert_eq!(publisher.calls(), 1);
    }

    #[tokio::test]
    async fn test_auth_error_uses_full_budget() {
        let publisher = ScriptedLogin::repeating("login failed: bad password", 10);
        let flow = fast_flow(publisher.clone());

        let report = flow.login_with_policy("aurora").await;
        assert!(!report.outcome.success);
        // 1 initial + 3 retries for auth errors
        assert_eq!(report.attempts, 4);
        assert_eq!(report.kind, Some(ErrorKind::AuthError));
        assert_eq!(publisher.calls(), 4);
    }

    #[tokio::test]
    async fn test_network_error_budget() {
        let publisher = ScriptedLogin::repeating("dns lookup failed", 10);
        let flow = fast_flow(publisher.clone());

        let report = flow.login_with_policy("aurora").await;
        // 1 initial + 5 retries for network errors
        assert_eq!(report.attempts, 6);
        assert_eq!(report.kind, Some(ErrorKind::NetworkError));
    }

    #[tokio::test]
    async fn test_success_mid_budget_stops_retrying() {
        let publisher = ScriptedLogin::new(vec![
            PostOutcome::failed(PostStage::Login, "dns lookup failed"),
            PostOutcome {
                success: true,
                message: "logged in".to_string(),
                stage: PostStage::Login,
            },
        ]);
        let flow = fast_flow(publisher.clone());

        let report = flow.login_with_policy("aurora").await;
        assert!(report.outcome.success);
        assert_eq!(report.attempts, 2);
        assert!(report.kind.is_none());
        assert_eq!(publisher.calls(), 2);
    }

    #[tokio::test]
    async fn test_report_policy_matches_final_kind() {
        let publisher = ScriptedLogin::repeating("invalid credentials", 10);
        let flow = fast_flow(publisher.clone());

        let report = flow.login_with_policy("aurora").await;
        assert_eq!(report.kind, Some(ErrorKind::AuthError));
        let policy = report.policy().unwrap();
        assert_eq!(policy.cooldown_secs, 300);
        assert_eq!(policy.max_login_retries, 3);
    }

    #[test]
    fn test_backoff_caps_after_three_doublings() {
        let publisher = ScriptedLogin::new(vec![]);
        let flow = LoginFlow::with_base_delay(publisher, Duration::from_secs(10));

        assert_eq!(flow.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(flow.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(flow.backoff_delay(3), Duration::from_secs(40));
        assert_eq!(flow.backoff_delay(4), Duration::from_secs(80));
        assert_eq!(flow.backoff_delay(5), Duration::from_secs(80));
        assert_eq!(flow.backoff_delay(9), Duration::from_secs(80));
    }
}
