//! Scheduled tasks

pub mod polling;

pub use polling::{PersistencePolicy, PollSummary, PollingTask};
