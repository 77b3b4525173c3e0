//! Exchange and queue layout
//!
//! The layout is declared by every process that touches the broker, so
//! declaration must be idempotent: redeclaring identical entities is a
//! no-op, while a mismatch (for example a different TTL on an existing
//! queue) is refused by the broker and surfaces as a fatal
//! [`BrokerError::TopologyDeclaration`].

use async_trait::async_trait;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::Channel;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use super::error::{BrokerError, BrokerResult};

pub const EXCHANGE: &str = "job_tracker";
pub const DEAD_LETTER_EXCHANGE: &str = "dlx_job_tracker";
pub const PRIMARY_QUEUE: &str = "vacancies";
pub const DEAD_LETTER_QUEUE: &str = "dl_vacancies";
pub const ROUTING_KEY: &str = "vacancies";
pub const DEAD_LETTER_ROUTING_KEY: &str = "failed.vacancies";

/// Messages not consumed within 10 minutes are dead-lettered
pub const PRIMARY_TTL: Duration = Duration::from_millis(600_000);

/// Dead letters are kept for two days
pub const DEAD_LETTER_TTL: Duration = Duration::from_millis(172_800_000);

pub const DEFAULT_DECLARE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeSpec {
    /// Durable direct exchange
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Direct,
            durable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub bound_exchange: String,
    pub routing_key: String,
    pub durable: bool,
    pub message_ttl: Duration,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    pub declare_timeout: Duration,
}

impl QueueSpec {
    /// Declaration arguments as sent to the broker
    pub fn arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();

        let ttl_ms = self.message_ttl.as_millis();
        let ttl = match i32::try_from(ttl_ms) {
            Ok(v) => AMQPValue::LongInt(v),
            Err(_) => AMQPValue::LongLongInt(i64::try_from(ttl_ms).unwrap_or(i64::MAX)),
        };
        args.insert(ShortString::from("x-message-ttl"), ttl);

        if let Some(dlx) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from("x-dead-letter-exchange"),
                AMQPValue::LongString(LongString::from(dlx.as_str())),
            );
        }
        if let Some(key) = &self.dead_letter_routing_key {
            args.insert(
                ShortString::from("x-dead-letter-routing-key"),
                AMQPValue::LongString(LongString::from(key.as_str())),
            );
        }

        args
    }

    /// Where a publisher must send messages to land in this queue
    pub fn route(&self) -> Route {
        Route {
            exchange: self.bound_exchange.clone(),
            routing_key: self.routing_key.clone(),
        }
    }
}

/// Exchange plus routing key a message is published with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub exchange: String,
    pub routing_key: String,
}

/// Declaration seam between the layout and a live channel
#[async_trait]
pub trait TopologyChannel: Send + Sync {
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> BrokerResult<()>;

    async fn declare_queue(&self, queue: &QueueSpec) -> BrokerResult<()>;

    async fn bind_queue(&self, queue: &QueueSpec) -> BrokerResult<()>;
}

#[async_trait]
impl TopologyChannel for Channel {
    async fn declare_exchange(&self, exchange: &ExchangeSpec) -> BrokerResult<()> {
        self.exchange_declare(
            &exchange.name,
            exchange.kind.into(),
            ExchangeDeclareOptions {
                durable: exchange.durable,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::topology(&exchange.name, e.to_string()))
    }

    async fn declare_queue(&self, queue: &QueueSpec) -> BrokerResult<()> {
        self.queue_declare(
            &queue.name,
            QueueDeclareOptions {
                durable: queue.durable,
                ..QueueDeclareOptions::default()
            },
            queue.arguments(),
        )
        .await
        .map(|_| ())
        .map_err(|e| BrokerError::topology(&queue.name, e.to_string()))
    }

    async fn bind_queue(&self, queue: &QueueSpec) -> BrokerResult<()> {
        self.queue_bind(
            &queue.name,
            &queue.bound_exchange,
            &queue.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::topology(&queue.name, e.to_string()))
    }
}

/// Complete broker layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub exchange_declare_timeout: Duration,
}

impl Topology {
    /// The job tracker layout: a primary queue dead-lettering into a
    /// long-lived failure queue
    pub fn job_tracker() -> Self {
        Self {
            exchanges: vec![
                ExchangeSpec::direct(DEAD_LETTER_EXCHANGE),
                ExchangeSpec::direct(EXCHANGE),
            ],
            queues: vec![
                QueueSpec {
                    name: PRIMARY_QUEUE.to_string(),
                    bound_exchange: EXCHANGE.to_string(),
                    routing_key: ROUTING_KEY.to_string(),
                    durable: true,
                    message_ttl: PRIMARY_TTL,
                    dead_letter_exchange: Some(DEAD_LETTER_EXCHANGE.to_string()),
                    dead_letter_routing_key: Some(DEAD_LETTER_ROUTING_KEY.to_string()),
                    declare_timeout: DEFAULT_DECLARE_TIMEOUT,
                },
                QueueSpec {
                    name: DEAD_LETTER_QUEUE.to_string(),
                    bound_exchange: DEAD_LETTER_EXCHANGE.to_string(),
                    routing_key: DEAD_LETTER_ROUTING_KEY.to_string(),
                    durable: true,
                    message_ttl: DEAD_LETTER_TTL,
                    dead_letter_exchange: None,
                    dead_letter_routing_key: None,
                    declare_timeout: DEFAULT_DECLARE_TIMEOUT,
                },
            ],
            exchange_declare_timeout: DEFAULT_DECLARE_TIMEOUT,
        }
    }

    /// Use one timeout for every declaration step
    pub fn with_declare_timeout(mut self, declare_timeout: Duration) -> Self {
        self.exchange_declare_timeout = declare_timeout;
        for queue in &mut self.queues {
            queue.declare_timeout = declare_timeout;
        }
        self
    }

    pub fn queue(&self, name: &str) -> Option<&QueueSpec> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Queue that producers publish into and consumers read from
    pub fn primary_queue(&self) -> BrokerResult<&QueueSpec> {
        self.queue(PRIMARY_QUEUE)
            .ok_or_else(|| BrokerError::topology(PRIMARY_QUEUE, "queue missing from topology"))
    }

    /// Check the layout is self-consistent before touching the broker
    pub fn validate(&self) -> BrokerResult<()> {
        let mut exchange_names = HashSet::new();
        for exchange in &self.exchanges {
            if exchange.name.is_empty() {
                return Err(BrokerError::topology("<exchange>", "name must not be empty"));
            }
            if !exchange_names.insert(exchange.name.as_str()) {
                return Err(BrokerError::topology(&exchange.name, "exchange declared twice"));
            }
        }

        let mut queue_names = HashSet::new();
        for queue in &self.queues {
            if queue.name.is_empty() {
                return Err(BrokerError::topology("<queue>", "name must not be empty"));
            }
            if !queue_names.insert(queue.name.as_str()) {
                return Err(BrokerError::topology(&queue.name, "queue declared twice"));
            }
            if !exchange_names.contains(queue.bound_exchange.as_str()) {
                return Err(BrokerError::topology(
                    &queue.name,
                    format!("bound to undeclared exchange '{}'", queue.bound_exchange),
                ));
            }
            match (&queue.dead_letter_exchange, &queue.dead_letter_routing_key) {
                (Some(dlx), _) if !exchange_names.contains(dlx.as_str()) => {
                    return Err(BrokerError::topology(
                        &queue.name,
                        format!("dead-letters to undeclared exchange '{}'", dlx),
                    ));
                }
                (None, Some(_)) => {
                    return Err(BrokerError::topology(
                        &queue.name,
                        "dead-letter routing key without dead-letter exchange",
                    ));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Declare exchanges, then queues with their bindings
    pub async fn declare(&self, channel: &dyn TopologyChannel) -> BrokerResult<()> {
        self.validate()?;

        for exchange in &self.exchanges {
            timeout(
                self.exchange_declare_timeout,
                channel.declare_exchange(exchange),
            )
            .await
            .map_err(|_| BrokerError::timeout("exchange declare", self.exchange_declare_timeout))??;
            debug!(exchange = %exchange.name, "Exchange declared");
        }

        for queue in &self.queues {
            timeout(queue.declare_timeout, channel.declare_queue(queue))
                .await
                .map_err(|_| BrokerError::timeout("queue declare", queue.declare_timeout))??;

            timeout(queue.declare_timeout, channel.bind_queue(queue))
                .await
                .map_err(|_| BrokerError::timeout("queue bind", queue.declare_timeout))??;
            debug!(
                queue = %queue.name,
                exchange = %queue.bound_exchange,
                routing_key = %queue.routing_key,
                "Queue declared and bound"
            );
        }

        info!(
            exchanges = self.exchanges.len(),
            queues = self.queues.len(),
            "Broker topology declared"
        );
        Ok(())
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::job_tracker()
    }
}
