//! HTTP surface of the autopilot
//!
//! Wraps the [`api`] router in an axum server plus the tower-http layers
//! (CORS, request tracing) that the config toggles on or off. The server
//! owns no scheduling logic; every handler delegates to the
//! [`Autopilot`](crate::autopilot::Autopilot) or reads the store.

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::autopilot::Autopilot;
use crate::config::ServerConfig;
use crate::store::SharedStore;

use api::create_router;

// ============================================================================
// App State
// ============================================================================

/// State threaded through every handler
#[derive(Clone)]
pub struct AppState {
    /// Runs ticks and owns the account schedule transitions
    pub autopilot: Arc<Autopilot>,

    /// Store handle for the read-only listing endpoints
    pub store: SharedStore,

    /// When this process came up, for the health endpoint's uptime field
    pub start_time: Instant,
}

// ============================================================================
// API Server
// ============================================================================

/// Binds the listener and serves the autopilot API
pub struct ApiServer {
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, autopilot: Arc<Autopilot>, store: SharedStore) -> Self {
        let state = AppState {
            autopilot,
            store,
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Clone out the handler state, mainly for tests that call handlers directly
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Assemble the full router, with the optional tower-http layers applied
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }
        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Bind(self.config.bind_address, e.to_string()))
    }

    /// Serve until the process is killed
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        tracing::info!(addr = %self.config.bind_address, "API server listening");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }

    /// Serve until `shutdown_signal` resolves, then drain in-flight requests
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        tracing::info!(addr = %self.config.bind_address, "API server listening");

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))?;

        tracing::info!("API server drained and stopped");
        Ok(())
    }

    /// Snapshot of the serving configuration, for startup banners
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.bind_address,
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// What the server was configured to do, in printable form
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    pub fn display(&self) -> String {
        let on_off = |flag: bool| if flag { "enabled" } else { "disabled" };
        format!(
            "Postpilot API Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            on_off(self.cors_enabled),
            on_off(self.request_logging_enabled),
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum ServerError {
    /// The configured address could not be bound
    #[error("Failed to bind {0}: {1}")]
    Bind(SocketAddr, String),

    /// The accept loop ended with an error
    #[error("Server error: {0}")]
    Serve(String),
}

// ============================================================================
// Tests
// ============================================================================
