//! jobwatch - job posting watcher with a RabbitMQ relay
//!
//! Two processes share this library:
//!
//! - **observe** polls listing pages on a schedule, drops postings already
//!   seen and publishes the rest to the broker with publisher confirms;
//! - **relay** consumes the queue and fans every posting out to chat
//!   recipients, acknowledging only when all of them were served.
//!
//! # Architecture
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Records, fingerprints and record sets
//! - [`loader`] - Listing page fetching and parsing
//! - [`storage`] - SQLite seen set
//! - [`broker`] - AMQP topology, publisher and consumer
//! - [`notifications`] - Message rendering and Telegram delivery
//! - [`scheduler`] - Interval job scheduler
//! - [`tasks`] - The polling task run by the scheduler
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use jobwatch::broker::{BrokerClient, Publisher, Topology};
//! use jobwatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let topology = Topology::job_tracker();
//!     let route = topology.primary_queue()?.route();
//!     let publisher = Publisher::connect(BrokerClient::new(config.broker), topology, route).await?;
//!     publisher.close().await;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod loader;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod tasks;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broker::{BrokerError, MessageSender, Publisher, Topology};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, JobwatchErrorTrait, Result};
    pub use crate::loader::{HtmlLoader, Loader};
    pub use crate::models::{Fingerprint, Record, RecordSet};
    pub use crate::notifications::{Notifier, Recipient};
    pub use crate::scheduler::{JobScheduler, ScheduledTask, SchedulerConfig};
    pub use crate::storage::{Database, Repository, SqliteSeenRepository};
    pub use crate::tasks::{PersistencePolicy, PollingTask};
}

pub use models::{Fingerprint, Record, RecordSet};
