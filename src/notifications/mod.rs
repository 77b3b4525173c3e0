//! Delivery of postings to chat recipients
//!
//! The relay process renders every consumed [`Record`](crate::models::Record)
//! with [`format::render`] and hands the text plus its link buttons to a
//! [`Notifier`], once per recipient. Alongside, [`bot::CommandListener`]
//! answers `/start` so users can learn the id to be registered under.
//!
//! # Example
//!
//! ```rust,ignore
//! use jobwatch::notifications::{format, Notifier, Recipient, TelegramConfig, TelegramNotifier};
//!
//! let notifier = TelegramNotifier::new(TelegramConfig::new("123:ABC"))?;
//! let message = format::render(&record);
//! notifier
//!     .send(&Recipient::new("42"), &message.text, &message.actions)
//!     .await?;
//! ```

pub mod bot;
pub mod format;
pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use bot::CommandListener;
pub use format::Message;
pub use telegram::{TelegramConfig, TelegramNotifier};

/// Result type for notifier operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors raised while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The request did not finish in time
    #[error("Notification timed out")]
    Timeout,

    /// The remote service answered but refused the message
    #[error("Notification rejected (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid notifier configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NotifyError {
    /// Whether a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout | Self::Http(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfig(_) => false,
        }
    }
}

/// Chat identifier a notification is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Link button attached below a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    pub url: String,
}

impl Action {
    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Something that can deliver a rendered message to one recipient
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Get the notifier name
    fn name(&self) -> &str;

    /// Deliver `text` with optional link buttons
    async fn send(&self, recipient: &Recipient, text: &str, actions: &[Action]) -> NotifyResult<()>;
}
