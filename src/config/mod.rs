//! Configuration management for postpilot
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Session store configuration
    pub sessions: SessionsConfig,

    /// Publishing sidecar configuration
    pub publisher: PublisherConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Scheduler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum accounts processed in one tick
    pub max_per_tick: usize,

    /// Tick lock time-to-live in seconds
    pub lock_ttl_secs: i64,

    /// How many unused captions to sample per pick
    pub caption_sample_size: usize,

    /// Lower bound of the transient-retry pause, seconds
    pub retry_delay_min_secs: u64,

    /// Upper bound of the transient-retry pause, seconds
    pub retry_delay_max_secs: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the API server binds to
    pub bind_address: SocketAddr,

    /// Enable permissive CORS
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Where login-session blobs live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// One file per account under `sessions.dir`
    Local,
    /// Object-storage style HTTP endpoint at `sessions.base_url`
    Http,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Backend selection
    pub backend: SessionBackend,

    /// Directory for the local backend
    pub dir: PathBuf,

    /// Endpoint for the http backend
    pub base_url: Option<String>,

    /// Request timeout for the http backend, seconds
    pub timeout_secs: u64,
}

/// Publishing sidecar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Sidecar endpoint URL
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Base delay for login retry backoff, seconds
    pub login_backoff_base_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let max_per_tick = std::env::var("POSTPILOT_MAX_PER_TICK")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(25);

        let lock_ttl_secs = std::env::var("POSTPILOT_LOCK_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(300);

        let caption_sample_size = std::env::var("POSTPILOT_CAPTION_SAMPLE_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(50);

        let retry_delay_min_secs = std::env::var("POSTPILOT_RETRY_DELAY_MIN")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let retry_delay_max_secs = std::env::var("POSTPILOT_RETRY_DELAY_MAX")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(20);

        let bind_address = std::env::var("POSTPILOT_BIND_ADDRESS")
            .ok()
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or_else(default_bind_address);

        let sqlite_path = std::env::var("POSTPILOT_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/postpilot.db"))
            .into();

        let session_backend = match std::env::var("POSTPILOT_SESSION_BACKEND").as_deref() {
            Ok("http") => SessionBackend::Http,
            _ => SessionBackend::Local,
        };

        let session_dir = std::env::var("POSTPILOT_SESSION_DIR")
            .unwrap_or_else(|_| String::from("data/sessions"))
            .into();

        let session_base_url = std::env::var("POSTPILOT_SESSION_URL").ok();

        let publisher_url = std::env::var("POSTPILOT_PUBLISHER_URL")
            .unwrap_or_else(|_| String::from("http://127.0.0.1:8787"));

        let publisher_timeout_secs = std::env::var("POSTPILOT_PUBLISHER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let log_level =
            std::env::var("POSTPILOT_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("POSTPILOT_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            scheduler: SchedulerConfig {
                max_per_tick,
                lock_ttl_secs,
                caption_sample_size,
                retry_delay_min_secs,
                retry_delay_max_secs,
            },
            server: ServerConfig {
                bind_address,
                enable_cors: true,
                enable_request_logging: true,
            },
            storage: StorageConfig { sqlite_path },
            sessions: SessionsConfig {
                backend: session_backend,
                dir: session_dir,
                base_url: session_base_url,
                timeout_secs: 10,
            },
            publisher: PublisherConfig {
                base_url: publisher_url,
                timeout_secs: publisher_timeout_secs,
                login_backoff_base_secs: 10,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_per_tick == 0 {
            anyhow::bail!("max_per_tick must be greater than 0");
        }

        if self.scheduler.lock_ttl_secs <= 0 {
            anyhow::bail!("lock_ttl_secs must be positive");
        }

        if self.scheduler.caption_sample_size == 0 {
            anyhow::bail!("caption_sample_size must be greater than 0");
        }

        if self.scheduler.retry_delay_min_secs > self.scheduler.retry_delay_max_secs {
            anyhow::bail!("retry_delay_min_secs must not exceed retry_delay_max_secs");
        }

        if self.publisher.base_url.is_empty() {
            anyhow::bail!("publisher.base_url must not be empty");
        }

        if self.sessions.backend == SessionBackend::Http && self.sessions.base_url.is_none() {
            anyhow::bail!("sessions.base_url is required for the http backend");
        }

        Ok(())
    }

    /// Get publisher request timeout as Duration
    #[must_use]
    pub fn publisher_timeout(&self) -> Duration {
        Duration::from_secs(self.publisher.timeout_secs)
    }

    /// Get session-store request timeout as Duration
    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.sessions.timeout_secs)
    }

    /// Get login retry backoff base as Duration
    #[must_use]
    pub fn login_backoff_base(&self) -> Duration {
        Duration::from_secs(self.publisher.login_backoff_base_secs)
    }
}

impl SchedulerConfig {
    /// Tick lock time-to-live
    #[must_use]
    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_ttl_secs)
    }

    /// Transient-retry pause window
    #[must_use]
    pub fn retry_window(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.retry_delay_min_secs),
            Duration::from_secs(self.retry_delay_max_secs),
        )
    }
}

fn default_bind_address() -> SocketAddr {
    "127.0.0.1:8686".parse().unwrap_or_else(|_| {
        // unreachable for a literal, but avoids a panic path in config loading
        SocketAddr::from(([127, 0, 0, 1], 8686))
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig {
                max_per_tick: 25,
                lock_ttl_secs: 300,
                caption_sample_size: 50,
                retry_delay_min_secs: 10,
                retry_delay_max_secs: 20,
            },
            server: ServerConfig {
                bind_address: default_bind_address(),
                enable_cors: true,
                enable_request_logging: true,
            },
            storage: StorageConfig {
                sqlite_path: PathBuf::from("data/postpilot.db"),
            },
            sessions: SessionsConfig {
                backend: SessionBackend::Local,
                dir: PathBuf::from("data/sessions"),
                base_url: None,
                timeout_secs: 10,
            },
            publisher: PublisherConfig {
                base_url: String::from("http://127.0.0.1:8787"),
                timeout_secs: 30,
                login_backoff_base_secs: 10,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
