//! Confirmed, persistent publishing of records

use async_trait::async_trait;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::types::ShortString;
use lapin::BasicProperties;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::connection::{BrokerClient, BrokerSession};
use super::error::{BrokerError, BrokerResult, Operation};
use super::topology::{Route, Topology};
use crate::models::{Fingerprint, Record};
use crate::utils::retry::{with_retry_if, RetryConfig};

/// AMQP delivery mode for messages that survive a broker restart
const PERSISTENT: u8 = 2;

const CONTENT_TYPE: &str = "application/json";

/// Anything that can hand a record to the broker
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Publish one record keyed by its fingerprint
    ///
    /// `Ok(true)` means the broker confirmed a routed message. `Ok(false)`
    /// means it was refused or unroutable. Either way the caller decides
    /// whether to remember the record.
    async fn publish(&self, record: &Record, fingerprint: &Fingerprint) -> BrokerResult<bool>;
}

/// Publisher over a confirm-mode channel
pub struct Publisher {
    client: BrokerClient,
    topology: Topology,
    route: Route,
    confirm_timeout: Duration,
    retry: RetryConfig,
    session: Mutex<Option<BrokerSession>>,
}

impl Publisher {
    /// Open a session and declare the topology
    pub async fn connect(client: BrokerClient, topology: Topology, route: Route) -> BrokerResult<Self> {
        let confirm_timeout = client.config().confirm_timeout;
        let retry = RetryConfig::with_delays(client.config().reconnect_attempts, 1000, 30_000);

        let publisher = Self {
            client,
            topology,
            route,
            confirm_timeout,
            retry,
            session: Mutex::new(None),
        };

        let session = publisher.open_session().await?;
        *publisher.session.lock().await = Some(session);

        info!(
            exchange = %publisher.route.exchange,
            routing_key = %publisher.route.routing_key,
            "Publisher ready"
        );
        Ok(publisher)
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    async fn open_session(&self) -> BrokerResult<BrokerSession> {
        let session = self.client.connect(true).await?;
        if let Err(e) = self.topology.declare(session.channel()).await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn reconnect(&self) -> BrokerResult<BrokerSession> {
        with_retry_if(&self.retry, || self.open_session(), BrokerError::is_recoverable).await
    }

    /// Close the channel and then the connection
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
            info!("Publisher closed");
        }
    }
}

#[async_trait]
impl MessageSender for Publisher {
    async fn publish(&self, record: &Record, fingerprint: &Fingerprint) -> BrokerResult<bool> {
        let payload = record.to_bytes()?;

        let mut guard = self.session.lock().await;
        if !guard.as_ref().is_some_and(BrokerSession::is_open) {
            if let Some(stale) = guard.take() {
                warn!("Broker session lost, reconnecting");
                stale.close().await;
            }
            *guard = Some(self.reconnect().await?);
        }
        let session = guard
            .as_ref()
            .ok_or_else(|| BrokerError::connection("no broker session"))?;
        let channel = session.channel();

        let properties = message_properties(fingerprint);

        let confirmed = timeout(self.confirm_timeout, async {
            channel
                .basic_publish(
                    &self.route.exchange,
                    &self.route.routing_key,
                    publish_options(),
                    &payload,
                    properties,
                )
                .await?
                .await
        })
        .await
        .map_err(|_| BrokerError::timeout("publish confirm", self.confirm_timeout))?
        .map_err(|e| BrokerError::from_lapin(Operation::Publish, e))?;

        let outcome = confirmation_outcome(confirmed);
        debug!(
            fingerprint = %fingerprint,
            confirmed = ?outcome.as_ref().ok(),
            "Publish settled"
        );
        outcome
    }
}

/// Mandatory, so an unroutable message comes back instead of vanishing
fn publish_options() -> BasicPublishOptions {
    BasicPublishOptions {
        mandatory: true,
        ..BasicPublishOptions::default()
    }
}

/// Persistent JSON message keyed by the record fingerprint
fn message_properties(fingerprint: &Fingerprint) -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(PERSISTENT)
        .with_message_id(ShortString::from(fingerprint.as_str()))
        .with_content_type(ShortString::from(CONTENT_TYPE))
}

/// Map a publisher confirm to the delivered / not delivered outcome
fn confirmation_outcome(confirmation: Confirmation) -> BrokerResult<bool> {
    match confirmation {
        Confirmation::Ack(None) => Ok(true),
        Confirmation::Ack(Some(returned)) => {
            warn!(
                reply_code = returned.reply_code,
                reply_text = returned.reply_text.as_str(),
                "Message returned as unroutable"
            );
            Ok(false)
        }
        Confirmation::Nack(_) => {
            warn!("Message nacked by broker");
            Ok(false)
        }
        Confirmation::NotRequested => Err(BrokerError::publish(
            "publisher confirms are not enabled on the channel",
        )),
    }
}
