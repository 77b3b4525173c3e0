//! Error types for broker operations

use std::time::Duration;
use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors raised while talking to the message broker
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection or channel could not be opened, or was lost
    #[error("Broker connection failed: {reason}")]
    ConnectionFailure { reason: String },

    /// Exchange or queue declaration was refused
    #[error("Topology declaration failed for '{entity}': {reason}")]
    TopologyDeclaration { entity: String, reason: String },

    /// Publish was refused or the channel broke mid-publish
    #[error("Publish failed: {reason}")]
    PublishFailure { reason: String },

    /// Consumer stream broke or acknowledgement failed
    #[error("Consume failed: {reason}")]
    ConsumeFailure { reason: String },

    /// Record could not be encoded or decoded
    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    /// Operation did not finish within its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl BrokerError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            reason: reason.into(),
        }
    }

    pub fn topology(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TopologyDeclaration {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn publish(reason: impl Into<String>) -> Self {
        Self::PublishFailure {
            reason: reason.into(),
        }
    }

    pub fn consume(reason: impl Into<String>) -> Self {
        Self::ConsumeFailure {
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "connection",
            Self::TopologyDeclaration { .. } => "topology",
            Self::PublishFailure { .. } => "publish",
            Self::ConsumeFailure { .. } => "consume",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether retrying the same operation may succeed
    ///
    /// Topology conflicts and malformed payloads are bugs in configuration
    /// or data and will fail the same way again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::TopologyDeclaration { .. } | Self::Serialization { .. }
        )
    }

    /// Classify a lapin error raised during `operation`
    ///
    /// Transport level failures become `ConnectionFailure`; anything else
    /// is attributed to the operation itself.
    pub(crate) fn from_lapin(operation: Operation, err: lapin::Error) -> Self {
        let transport = matches!(
            err,
            lapin::Error::IOError(_)
                | lapin::Error::InvalidConnectionState(_)
                | lapin::Error::InvalidChannelState(_)
                | lapin::Error::MissingHeartbeatError
        );

        if transport {
            return Self::connection(err.to_string());
        }

        match operation {
            Operation::Connect => Self::connection(err.to_string()),
            Operation::Publish => Self::publish(err.to_string()),
            Operation::Consume => Self::consume(err.to_string()),
        }
    }
}

/// Which broker operation a lapin error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Connect,
    Publish,
    Consume,
}
