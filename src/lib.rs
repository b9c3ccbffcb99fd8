//! postpilot - Social Media Posting Autopilot
//!
//! A scheduling service that keeps a pool of social accounts posting on a
//! cadence: each externally triggered tick sweeps the accounts that are due,
//! picks fresh content for them, publishes through a sidecar, and reschedules
//! them based on what happened.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`store`] - Persistence layer (SQLite, in-memory)
//! - [`autopilot`] - Tick sweeps, health transitions, scheduling
//! - [`publisher`] - Posting capability and retry handling
//! - [`classifier`] - Failure classification and login policies
//! - [`content`] - Caption and image selection
//! - [`session`] - Session blob storage backends
//! - [`server`] - HTTP API surface
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use postpilot::autopilot::Autopilot;
//! use postpilot::config::Config;
//! use postpilot::publisher::HttpPublisher;
//! use postpilot::session::build_session_store;
//! use postpilot::store::open_sqlite_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = open_sqlite_store(&config.storage.sqlite_path)?;
//!     let sessions = build_session_store(&config.sessions)?;
//!     let publisher = Arc::new(HttpPublisher::new(
//!         &config.publisher.base_url,
//!         config.publisher_timeout(),
//!         sessions,
//!     )?);
//!     let autopilot = Autopilot::new(store, publisher, &config.scheduler);
//!     // autopilot.run_tick().await?;
//!     Ok(())
//! }
//! ```

pub mod autopilot;
pub mod classifier;
pub mod config;
pub mod content;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod publisher;
pub mod server;
pub mod session;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::autopilot::{Autopilot, StatusReport, TickOutcome, TickReport};
    pub use crate::classifier::{ErrorKind, LoginPolicy};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{Account, Caption, HealthState, ImageAsset, PostAttempt};
    pub use crate::publisher::{PostOutcome, PostRequest, Publisher};
    pub use crate::store::{SharedStore, Store};
}

// Direct re-exports for convenience
pub use models::{Account, Caption, HealthState, ImageAsset, PostAttempt};
