//! Session blob storage for the posting capability
//!
//! Logging in to the platform produces an opaque per-account session blob
//! that later posts reuse. One trait fronts the two places such blobs can
//! live, selected by configuration:
//!
//! - [`LocalSessionStore`] - one JSON file per account under a directory,
//!   written atomically via temp-file rename
//! - [`HttpSessionStore`] - GET/PUT/DELETE against an object-storage style
//!   HTTP endpoint
//!
//! Blobs are opaque strings; nothing here inspects their contents.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::{SessionBackend, SessionsConfig};
use crate::error::{Error, Result};

/// Storage for opaque login-session blobs, keyed by username
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a blob; `None` when the account has no stored session
    async fn load(&self, username: &str) -> Result<Option<String>>;

    /// Store (or replace) a blob
    async fn save(&self, username: &str, blob: &str) -> Result<()>;

    /// Remove a blob; removing a missing one is not an error
    async fn delete(&self, username: &str) -> Result<()>;
}

/// Thread-safe shared session store handle
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Build the session store selected by configuration
pub fn build_session_store(config: &SessionsConfig) -> Result<SharedSessionStore> {
    match config.backend {
        SessionBackend::Local => Ok(Arc::new(LocalSessionStore::new(&config.dir)?)),
        SessionBackend::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| Error::config("sessions.base_url is required for the http backend"))?;
            Ok(Arc::new(HttpSessionStore::new(
                base_url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

// ============================================================================
// Local Filesystem Backend
// ============================================================================

/// Directory of `<username>.session.json` files
pub struct LocalSessionStore {
    dir: PathBuf,
}

impl LocalSessionStore {
    /// Create the store, making the directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn blob_path(&self, username: &str) -> Result<PathBuf> {
        // Usernames become file names; refuse anything that could escape
        // the session directory. Inner dots stay legal ("aurora.daily").
        if username.is_empty() || username.contains(['/', '\\']) || username.starts_with('.') {
            return Err(Error::other(format!("invalid session key '{username}'")));
        }
        Ok(self.dir.join(format!("{username}.session.json")))
    }
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn load(&self, username: &str) -> Result<Option<String>> {
        let path = self.blob_path(username)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, username: &str, blob: &str) -> Result<()> {
        let path = self.blob_path(username)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, blob).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!(path = %path.display(), "session blob saved");
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<()> {
        let path = self.blob_path(username)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "session blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// HTTP Object-Storage Backend
// ============================================================================

/// Sessions stored behind an HTTP endpoint at `{base_url}/sessions/{username}`
pub struct HttpSessionStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSessionStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn blob_url(&self, username: &str) -> String {
        format!("{}/sessions/{}", self.base_url, username)
    }
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn load(&self, username: &str) -> Result<Option<String>> {
        let response = self.client.get(self.blob_url(username)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.text().await?))
    }

    async fn save(&self, username: &str, blob: &str) -> Result<()> {
        self.client
            .put(self.blob_url(username))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(blob.to_string())
            .send()
            .await?
            .error_for_status()?;

        debug!(username, "session blob saved to remote store");
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<()> {
        let response = self.client.delete(self.blob_url(username)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }
}
