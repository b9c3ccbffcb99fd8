//! REST API handlers for the autopilot server
//!
//! This module defines the API routes and handlers.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::autopilot::TickOutcome;
use crate::error::Error;
use crate::metrics;
use crate::store::StoreError;

use super::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Body of the enable endpoint; both overrides optional
#[derive(Debug, Default, Deserialize)]
pub struct EnableRequest {
    #[serde(default)]
    pub cadence_minutes: Option<i64>,
    #[serde(default)]
    pub jitter_seconds: Option<i64>,
}

// Map a domain error onto a response status
fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Store(StoreError::NotFound(_)) | Error::AccountNotFound(_) => StatusCode::NOT_FOUND,
        Error::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: Error) -> Response {
    (status_for(&error), Json(ErrorResponse::new(error.to_string()))).into_response()
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Tick trigger
        .route("/tick", post(trigger_tick))
        // Scheduler snapshot
        .route("/status", get(get_status))
        // Account endpoints
        .route("/accounts", get(list_accounts))
        .route("/accounts/{id}/enable", post(enable_account))
        .route("/accounts/{id}/disable", post(disable_account))
        // Observability endpoints
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

// Request counter/latency middleware, labeled by route template
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

// ============================================================================
// Tick Handlers
// ============================================================================

/// Trigger one tick sweep
///
/// Returns 200 with the tick report, 409 when another tick holds the lock,
/// and 500 when the sweep hit a storage failure.
async fn trigger_tick(State(state): State<AppState>) -> Response {
    let started = Instant::now();

    match state.autopilot.run_tick().await {
        Ok(TickOutcome::Completed(report)) => {
            metrics::record_tick(
                report.successes as u64,
                report.failures as u64,
                started.elapsed().as_secs_f64(),
            );
            for result in &report.results {
                if let Some(kind) = result.error_kind {
                    metrics::record_post_failure(kind.as_str());
                }
            }
            (StatusCode::OK, Json(ApiResponse::success(report))).into_response()
        }
        Ok(TickOutcome::Busy) => {
            metrics::record_tick_busy();
            (
                StatusCode::CONFLICT,
                Json(ErrorResponse::new("another tick is in progress")),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Status Handlers
// ============================================================================

/// Scheduler snapshot: per-account health plus aggregate counts
async fn get_status(State(state): State<AppState>) -> Response {
    match state.autopilot.status() {
        Ok(report) => {
            metrics::update_account_gauges(report.stats.enabled, report.stats.due_now);
            (StatusCode::OK, Json(ApiResponse::success(report))).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Account Handlers
// ============================================================================

/// List all accounts with their schedule and health fields
async fn list_accounts(State(state): State<AppState>) -> Response {
    match state.store.list_accounts() {
        Ok(accounts) => {
            let view: Vec<crate::autopilot::AccountStatus> =
                accounts.iter().map(Into::into).collect();
            (StatusCode::OK, Json(ApiResponse::success(view))).into_response()
        }
        Err(e) => error_response(e.into()),
    }
}

/// Turn autopilot on for an account
async fn enable_account(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<EnableRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    match state
        .autopilot
        .enable_account(id, request.cadence_minutes, request.jitter_seconds)
    {
        Ok(account) => (
            StatusCode::OK,
            Json(ApiResponse::success(crate::autopilot::AccountStatus::from(
                &account,
            ))),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Turn autopilot off for an account
async fn disable_account(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.autopilot.disable_account(id) {
        Ok(account) => (
            StatusCode::OK,
            Json(ApiResponse::success(crate::autopilot::AccountStatus::from(
                &account,
            ))),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

/// Prometheus exposition endpoint
async fn export_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
