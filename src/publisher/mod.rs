//! Posting capability boundary
//!
//! The autopilot treats publishing as an opaque capability behind the
//! [`Publisher`] trait: hand it an account's content, get back an outcome.
//! Failures come back as data rather than `Err` - the outcome message is
//! what the classifier and the health machine consume, and a publisher that
//! cannot even reach its backend reports that as a failed outcome too.
//!
//! [`HttpPublisher`] is the shipped adapter: it forwards requests to a
//! publishing sidecar over JSON, passing the stored session blob along and
//! persisting any refreshed blob the sidecar returns.

pub mod executor;
pub mod login;

pub use executor::PostExecutor;
pub use login::{LoginFlow, LoginReport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{Account, Caption, ImageAsset};
use crate::session::SharedSessionStore;

/// Which phase of the pipeline produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStage {
    /// Session establishment or refresh
    Login,
    /// The publish call itself
    Publish,
}

/// Input to one publish invocation
#[derive(Debug, Clone, Serialize)]
pub struct PostRequest {
    pub username: String,
    /// Opaque handle the capability may use to resolve the session
    pub session_ref: Option<String>,
    pub caption: String,
    pub image_url: Option<String>,
}

impl PostRequest {
    pub fn new(account: &Account, caption: &Caption, image: Option<&ImageAsset>) -> Self {
        Self {
            username: account.username.clone(),
            session_ref: account.session_ref.clone(),
            caption: caption.text.clone(),
            image_url: image.map(|i| i.url.clone()),
        }
    }
}

/// Result of one publish or login invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOutcome {
    pub success: bool,
    pub message: String,
    pub stage: PostStage,
}

impl PostOutcome {
    /// Successful publish
    pub fn posted(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            stage: PostStage::Publish,
        }
    }

    /// Failed invocation at the given stage
    pub fn failed(stage: PostStage, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            stage,
        }
    }
}

/// The opaque posting capability
///
/// Both operations are total: anything that goes wrong, including transport
/// failures, is reported through the outcome.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one post on behalf of an account
    async fn post(&self, request: &PostRequest) -> PostOutcome;

    /// Establish (or refresh) a login session for an account
    async fn login(&self, username: &str) -> PostOutcome;
}

/// Thread-safe shared publisher handle
pub type SharedPublisher = Arc<dyn Publisher>;

// ============================================================================
// HTTP Sidecar Adapter
// ============================================================================

// Wire payload for the sidecar's POST /post
#[derive(Serialize)]
struct WirePost<'a> {
    username: &'a str,
    session_ref: Option<&'a str>,
    session: Option<&'a str>,
    caption: &'a str,
    image_url: Option<&'a str>,
}

#[derive(Serialize)]
struct WireLogin<'a> {
    username: &'a str,
}

// Sidecar response shape, shared by /post and /login
#[derive(Deserialize)]
struct WireOutcome {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    stage: Option<String>,
    /// Refreshed session blob, persisted on receipt
    #[serde(default)]
    session: Option<String>,
}

/// Publisher adapter talking JSON to a publishing sidecar
pub struct HttpPublisher {
    base_url: String,
    client: reqwest::Client,
    sessions: SharedSessionStore,
}

impl HttpPublisher {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        sessions: SharedSessionStore,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            sessions,
        })
    }

    async fn try_post(&self, request: &PostRequest) -> Result<PostOutcome> {
        let session = self.sessions.load(&request.username).await?;

        let payload = WirePost {
            username: &request.username,
            session_ref: request.session_ref.as_deref(),
            session: session.as_deref(),
            caption: &request.caption,
            image_url: request.image_url.as_deref(),
        };

        let wire: WireOutcome = self
            .client
            .post(format!("{}/post", self.base_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(self.absorb(&request.username, wire, PostStage::Publish).await)
    }

    async fn try_login(&self, username: &str) -> Result<PostOutcome> {
        let wire: WireOutcome = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&WireLogin { username })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(self.absorb(username, wire, PostStage::Login).await)
    }

    // Persist any refreshed session and map the wire shape to an outcome.
    async fn absorb(
        &self,
        username: &str,
        wire: WireOutcome,
        default_stage: PostStage,
    ) -> PostOutcome {
        if let Some(blob) = &wire.session {
            if let Err(e) = self.sessions.save(username, blob).await {
                // the post itself already happened; losing the refresh only
                // costs a re-login later
                warn!(username, error = %e, "could not persist refreshed session");
            } else {
                debug!(username, "refreshed session persisted");
            }
        }

        let stage = match wire.stage.as_deref() {
            Some("login") => PostStage::Login,
            Some("publish") => PostStage::Publish,
            _ => default_stage,
        };

        PostOutcome {
            success: wire.success,
            message: wire.message,
            stage,
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn post(&self, request: &PostRequest) -> PostOutcome {
        match self.try_post(request).await {
            Ok(outcome) => outcome,
            Err(e) => PostOutcome::failed(PostStage::Publish, format!("network error: {e}")),
        }
    }

    async fn login(&self, username: &str) -> PostOutcome {
        match self.try_login(username).await {
            Ok(outcome) => outcome,
            Err(e) => PostOutcome::failed(PostStage::Login, format!("network error: {e}")),
        }
    }
}
