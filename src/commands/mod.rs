//! Command implementations for the postpilot CLI

pub mod account;
pub mod content;
pub mod login;
pub mod serve;
pub mod tick;

// Re-export command functions for convenience
pub use account::{account_add, account_disable, account_enable, account_list, history};
pub use content::{caption_add, image_add};
pub use login::login;
pub use serve::serve;
pub use tick::{status, tick};

use std::sync::Arc;

use anyhow::Result;

use postpilot::autopilot::Autopilot;
use postpilot::config::Config;
use postpilot::publisher::{HttpPublisher, SharedPublisher};
use postpilot::session::build_session_store;
use postpilot::store::{open_sqlite_store, SharedStore};

/// Open the SQLite store at the configured path
pub(crate) fn open_store(config: &Config) -> Result<SharedStore> {
    Ok(open_sqlite_store(&config.storage.sqlite_path)?)
}

/// Build the HTTP publisher with its session store
pub(crate) fn build_publisher(config: &Config) -> Result<SharedPublisher> {
    let sessions = build_session_store(&config.sessions)?;
    let publisher = HttpPublisher::new(
        &config.publisher.base_url,
        config.publisher_timeout(),
        sessions,
    )?;
    Ok(Arc::new(publisher))
}

/// Wire the full autopilot stack
pub(crate) fn build_autopilot(config: &Config) -> Result<(Arc<Autopilot>, SharedStore)> {
    let store = open_store(config)?;
    let publisher = build_publisher(config)?;
    let autopilot = Arc::new(Autopilot::new(store.clone(), publisher, &config.scheduler));
    Ok((autopilot, store))
}
