//! Single-retry execution of post attempts
//!
//! One invocation per due account, and at most one more when the failure
//! looks transient. The pause before the retry is drawn uniformly from a
//! window so a fleet of accounts failing together does not retry in
//! lockstep. Anything past the retry is the health machine's problem.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::classifier;
use crate::publisher::{PostOutcome, PostRequest, SharedPublisher};

/// Default retry pause window, seconds
const DEFAULT_RETRY_DELAY_MIN_SECS: u64 = 10;
const DEFAULT_RETRY_DELAY_MAX_SECS: u64 = 20;

/// Drives a [`Publisher`](crate::publisher::Publisher) with the
/// one-transient-retry rule
pub struct PostExecutor {
    publisher: SharedPublisher,
    retry_delay_min: Duration,
    retry_delay_max: Duration,
}

impl PostExecutor {
    pub fn new(publisher: SharedPublisher) -> Self {
        Self::with_retry_window(
            publisher,
            Duration::from_secs(DEFAULT_RETRY_DELAY_MIN_SECS),
            Duration::from_secs(DEFAULT_RETRY_DELAY_MAX_SECS),
        )
    }

    /// Override the retry pause window (tests shrink it to milliseconds)
    pub fn with_retry_window(
        publisher: SharedPublisher,
        retry_delay_min: Duration,
        retry_delay_max: Duration,
    ) -> Self {
        Self {
            publisher,
            retry_delay_min,
            retry_delay_max,
        }
    }

    /// Execute one post attempt, retrying once on a transient failure.
    ///
    /// A second failure keeps the retry's stage but prefixes the message so
    /// the attempt log shows the retry happened.
    pub async fn execute(&self, request: &PostRequest) -> PostOutcome {
        let first = self.publisher.post(request).await;
        if first.success || !classifier::is_transient(&first.message) {
            return first;
        }

        let delay = self.random_delay();
        warn!(
            username = %request.username,
            error = %first.message,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying once"
        );
        sleep(delay).await;

        let second = self.publisher.post(request).await;
        if second.success {
            info!(username = %request.username, "retry succeeded");
            second
        } else {
            PostOutcome {
                message: format!("retry failed: {}", second.message),
                ..second
            }
        }
    }

    fn random_delay(&self) -> Duration {
        let min = self.retry_delay_min.as_millis() as u64;
        let max = self.retry_delay_max.as_millis() as u64;
        if min >= max {
            return self.retry_delay_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
