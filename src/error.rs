//! Crate-wide error type
//!
//! Everything that crosses a module boundary returns [`Error`], with `?`
//! doing the conversions from the domain-specific types ([`StoreError`],
//! I/O, JSON, HTTP client).
//!
//! One deliberate exclusion: a post that fails is not an `Error`. Failed
//! attempts are recorded on the account and in the attempt log and travel
//! as [`crate::publisher::PostOutcome`] values. `Error` means the
//! operation itself could not finish, such as the database being
//! unreachable mid-sweep.

use std::io;
use thiserror::Error;

pub use crate::store::StoreError;

/// Coarse grouping used when deciding how to react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Database and filesystem faults
    Storage,
    /// Publisher sidecar or session-service transport faults
    Network,
    /// Malformed or unparseable data
    Serialization,
    /// Bad configuration, caught at startup or on first use
    Config,
    /// Anything that does not fit the buckets above
    Other,
}

impl ErrorCategory {
    /// Label used in log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Serialization => "serialization",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// The error type returned by fallible operations in this crate
#[derive(Error, Debug)]
pub enum Error {
    /// A store operation failed (accounts, content pool, attempts, lock rows)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An account named at the API or CLI boundary does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Filesystem fault, mostly from the local session store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A payload failed to serialize or parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP client could not complete a request
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A configuration value is missing or out of range
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all with a human-readable context line
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Whether retrying the same operation later could plausibly succeed
    ///
    /// Storage contention and transport faults qualify. Bad config and
    /// bad data never do; retrying would just repeat the failure.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Io(_) | Self::Http(_) => true,
            Self::AccountNotFound(_) | Self::Json(_) | Self::Config(_) | Self::Other { .. } => {
                false
            }
        }
    }

    /// The [`ErrorCategory`] this error falls into
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Http(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Config(_) => ErrorCategory::Config,
            Self::AccountNotFound(_) | Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Shorthand for a [`Error::Config`] with a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build an [`Error::Other`] from a context line alone
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Build an [`Error::Other`] that keeps the underlying cause in the chain
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// The binary entry points use anyhow; anything they hand back down is opaque.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
