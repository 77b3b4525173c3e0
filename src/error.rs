//! Unified error handling for the jobwatch crate
//!
//! Domain errors stay in their modules ([`BrokerError`], [`StorageError`],
//! [`LoadError`], [`NotifyError`], [`SchedulerError`]); this module wraps them
//! in a single [`Error`] so scheduled tasks and commands can propagate with `?`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobwatch::error::{Error, ErrorCategory, JobwatchErrorTrait};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error ({:?}): {err}", err.category());
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::broker::BrokerError;
pub use crate::loader::LoadError;
pub use crate::notifications::NotifyError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::storage::StorageError;

/// Common trait for jobwatch error types
pub trait JobwatchErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Broker connection, topology and messaging errors
    Broker,
    /// HTTP fetches of listing pages
    Network,
    /// Seen-set storage and I/O errors
    Storage,
    /// Chat delivery errors
    Notification,
    /// Encoding and decoding errors
    Serialization,
    /// Configuration and validation errors
    Config,
    /// Scheduler lifecycle errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broker => "broker",
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Notification => "notification",
            Self::Serialization => "serialization",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the jobwatch crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl JobwatchErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Broker(e) => e.is_recoverable(),
            Self::Storage(e) => matches!(e, StorageError::Io(_)),
            Self::Load(e) => e.is_recoverable(),
            Self::Notify(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Config(_) | Self::Json(_) | Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Broker(BrokerError::Serialization { .. }) => ErrorCategory::Serialization,
            Self::Broker(_) => ErrorCategory::Broker,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Load(_) => ErrorCategory::Network,
            Self::Notify(NotifyError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Notify(_) => ErrorCategory::Notification,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
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

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
