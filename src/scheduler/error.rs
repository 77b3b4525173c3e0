//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Job id was empty or blank
    InvalidJobId { id: String },

    /// Interval must be greater than zero
    InvalidInterval { job_id: String },

    /// `start` was called twice
    AlreadyStarted,

    /// The scheduler no longer accepts work
    ShutDown,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJobId { id } => {
                write!(f, "Invalid job id '{}': must not be blank", id)
            }
            Self::InvalidInterval { job_id } => {
                write!(f, "Invalid interval for job '{}': must be greater than zero", job_id)
            }
            Self::AlreadyStarted => write!(f, "Scheduler already started"),
            Self::ShutDown => write!(f, "Scheduler has been shut down"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid job id error
    pub fn invalid_job_id(id: impl Into<String>) -> Self {
        Self::InvalidJobId { id: id.into() }
    }

    /// Create an invalid interval error
    pub fn invalid_interval(job_id: impl Into<String>) -> Self {
        Self::InvalidInterval {
            job_id: job_id.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// Every scheduler error is a caller mistake or a lifecycle violation.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_job_id_error() {
        let err = SchedulerError::invalid_job_id("  ");
        assert!(err.to_string().contains("must not be blank"));
    }

    #[test]
    fn test_invalid_interval_error() {
        let err = SchedulerError::invalid_interval("hh");
        assert!(err.to_string().contains("'hh'"));
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(!SchedulerError::AlreadyStarted.is_recoverable());
        assert!(!SchedulerError::ShutDown.is_recoverable());
    }
}
