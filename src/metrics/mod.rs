//! Prometheus metrics
//!
//! Two metric families: the scheduler side (tick sweeps, post outcomes by
//! classified failure kind, account gauges) and the API side (request
//! counts and latency per route template).
//!
//! Register everything once at startup with [`init_metrics`]. Every
//! recording function degrades to a no-op when registration never
//! happened, so library users and unit tests need no setup.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Tick sweep and post outcome metrics
struct SchedulerMetrics {
    ticks: Counter,
    ticks_busy: Counter,
    tick_duration: Histogram,
    posts: CounterVec,
    post_failures: CounterVec,
    accounts_enabled: Gauge,
    accounts_due: Gauge,
}

/// HTTP request metrics
struct ApiMetrics {
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

static SCHEDULER_METRICS: OnceLock<SchedulerMetrics> = OnceLock::new();
static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Set on the first `init_metrics` call so later calls are cheap no-ops
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics against the default Prometheus registry
///
/// Idempotent: the first call registers, later calls return `Ok` without
/// touching the registry. On a registration error the recording functions
/// stay no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let scheduler = SchedulerMetrics {
        ticks: register_counter!(
            "postpilot_scheduler_ticks_total",
            "Total completed tick sweeps"
        )?,
        ticks_busy: register_counter!(
            "postpilot_scheduler_ticks_busy_total",
            "Total tick triggers rejected because the lock was held"
        )?,
        tick_duration: register_histogram!(
            "postpilot_scheduler_tick_duration_seconds",
            "Tick sweep duration in seconds",
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]
        )?,
        posts: register_counter_vec!(
            "postpilot_scheduler_posts_total",
            "Post attempts by result",
            &["result"]
        )?,
        post_failures: register_counter_vec!(
            "postpilot_scheduler_post_failures_total",
            "Failed post attempts by classified kind",
            &["kind"]
        )?,
        accounts_enabled: register_gauge!(
            "postpilot_accounts_enabled",
            "Accounts with autopilot enabled"
        )?,
        accounts_due: register_gauge!(
            "postpilot_accounts_due",
            "Accounts due at the last status refresh"
        )?,
    };

    let api = ApiMetrics {
        api_requests: register_counter_vec!(
            "postpilot_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "postpilot_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
    };

    SCHEDULER_METRICS
        .set(scheduler)
        .map_err(|_| "scheduler metrics already set")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already set")?;

    tracing::info!("Prometheus metrics registered");
    Ok(())
}

/// Whether registration ran to completion
pub fn metrics_initialized() -> bool {
    SCHEDULER_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Render everything in the default registry as exposition text
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a completed tick sweep
pub fn record_tick(successes: u64, failures: u64, duration_secs: f64) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    m.ticks.inc();
    m.tick_duration.observe(duration_secs);

    if successes > 0 {
        m.posts
            .with_label_values(&["success"])
            .inc_by(successes as f64);
    }
    if failures > 0 {
        m.posts
            .with_label_values(&["failure"])
            .inc_by(failures as f64);
    }
}

/// Record a tick trigger that lost the lock race
pub fn record_tick_busy() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.ticks_busy.inc();
    }
}

/// Record one classified post failure
pub fn record_post_failure(kind: &str) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.post_failures.with_label_values(&[kind]).inc();
    }
}

/// Update the account gauges from a status snapshot
pub fn update_account_gauges(enabled: usize, due: usize) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.accounts_enabled.set(enabled as f64);
        m.accounts_due.set(due as f64);
    }
}

/// Record one API request, labeled by route template and response status
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_initialized_flag_tracks_registration() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_produces_exposition_text() {
        ensure_metrics_initialized();
        let text = encode_metrics().unwrap();
        assert!(text.contains("postpilot_") || text.is_empty());
    }

    // The recording helpers below have no observable output through the
    // public API, so these just exercise the label paths.

    #[test]
    fn test_tick_recording() {
        ensure_metrics_initialized();
        record_tick(3, 1, 0.42);
        record_tick_busy();
    }

    #[test]
    fn test_failure_kind_recording() {
        ensure_metrics_initialized();
        record_post_failure("transient");
        record_post_failure("rate_limit");
    }

    #[test]
    fn test_account_gauges() {
        ensure_metrics_initialized();
        update_account_gauges(5, 2);
    }

    #[test]
    fn test_api_request_recording() {
        ensure_metrics_initialized();
        record_api_request("/tick", 200, 0.005);
    }

    #[test]
    fn test_recording_without_init_is_a_noop() {
        record_tick(1, 0, 0.01);
        record_tick_busy();
        record_post_failure("unknown");
        update_account_gauges(0, 0);
        record_api_request("/status", 200, 0.001);
    }
}
