//! RabbitMQ plumbing
//!
//! ```text
//! observe:  PollingTask ──publish(confirm)──▶ job_tracker ──vacancies──▶ [vacancies]
//!                                                                          │ ttl / reject
//!                                                                          ▼
//!                                      dlx_job_tracker ──failed.vacancies──▶ [dl_vacancies]
//! relay:    [vacancies] ──prefetch 1──▶ Consumer ──FanOut──▶ recipients
//! ```
//!
//! - [`topology`] describes and declares the exchanges and queues
//! - [`connection`] opens sessions (one connection plus one channel)
//! - [`publisher`] publishes persistent messages and waits for confirms
//! - [`consumer`] settles deliveries based on the fan-out outcome

pub mod connection;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod topology;

pub use connection::{BrokerClient, BrokerSession};
pub use consumer::{Consumer, Disposition, FanOut};
pub use error::{BrokerError, BrokerResult};
pub use publisher::{MessageSender, Publisher};
pub use topology::{ExchangeKind, ExchangeSpec, QueueSpec, Route, Topology, TopologyChannel};
