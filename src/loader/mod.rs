//! Listing page loaders
//!
//! A [`Loader`] turns a source URL into the [`RecordSet`] visible on it.
//! [`HtmlLoader`] fetches the page over HTTP and extracts vacancy cards
//! with the selectors in [`selectors`].

pub mod html;
pub mod selectors;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::RecordSet;

pub use html::HtmlLoader;

/// Errors that can occur while loading a listing
#[derive(Error, Debug)]
pub enum LoadError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl LoadError {
    /// Whether the next cycle may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::InvalidUrl(_) => false,
        }
    }
}

/// Source of records
#[async_trait]
pub trait Loader: Send + Sync {
    /// Fetch every record currently listed at `url`, in page order
    async fn fetch(&self, url: &str) -> Result<RecordSet, LoadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_recoverable() {
        assert!(LoadError::Status(503).is_recoverable());
        assert!(LoadError::Status(429).is_recoverable());
        assert!(!LoadError::Status(404).is_recoverable());
        assert!(!LoadError::InvalidUrl("ftp:/x".to_string()).is_recoverable());
    }
}
