//! Queue consumer relaying records to chat recipients
//!
//! Each delivery is settled exactly once:
//!
//! | Situation                                   | Disposition |
//! |---------------------------------------------|-------------|
//! | every recipient accepted the message        | `Ack`       |
//! | body does not decode                        | `Reject`    |
//! | any recipient failed or timed out           | `Reject`    |
//! | shutdown signalled before fan-out finished  | `Requeue`   |
//!
//! Rejected messages are not requeued and end up in the dead-letter queue.
//! Recipients that were already served before a failure or a requeue may
//! see the message again; fan-out is at-least-once.

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
};
use lapin::types::FieldTable;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{BrokerClient, BrokerSession};
use super::error::{BrokerError, BrokerResult, Operation};
use super::topology::Topology;
use crate::models::Record;
use crate::notifications::{format, Notifier, Recipient};
use crate::utils::signalled;

/// At most one unacknowledged delivery per consumer
const PREFETCH: u16 = 1;

/// How a delivery is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
    Reject,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Requeue => "requeue",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sends one decoded record to every recipient in order
pub struct FanOut {
    notifier: Arc<dyn Notifier>,
    recipients: Vec<Recipient>,
    send_timeout: Duration,
}

impl FanOut {
    pub fn new(notifier: Arc<dyn Notifier>, recipients: Vec<Recipient>, send_timeout: Duration) -> Self {
        Self {
            notifier,
            recipients,
            send_timeout,
        }
    }

    /// Decide the disposition of one message body
    pub async fn process(
        &self,
        body: &[u8],
        message_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Disposition {
        let record = match Record::from_slice(body) {
            Ok(record) => record,
            Err(e) => {
                warn!(message_id, error = %e, "Undecodable message");
                return Disposition::Reject;
            }
        };

        tokio::select! {
            biased;
            _ = signalled(shutdown) => {
                info!(message_id, "Shutdown during fan-out");
                Disposition::Requeue
            }
            disposition = self.deliver(&record, message_id) => disposition,
        }
    }

    async fn deliver(&self, record: &Record, message_id: &str) -> Disposition {
        let message = format::render(record);

        for recipient in &self.recipients {
            let sent = timeout(
                self.send_timeout,
                self.notifier.send(recipient, &message.text, &message.actions),
            )
            .await;

            match sent {
                Ok(Ok(())) => {
                    debug!(message_id, recipient = %recipient, "Delivered to recipient");
                }
                Ok(Err(e)) => {
                    warn!(
                        message_id,
                        recipient = %recipient,
                        notifier = self.notifier.name(),
                        error = %e,
                        "Failed to deliver message"
                    );
                    return Disposition::Reject;
                }
                Err(_) => {
                    warn!(
                        message_id,
                        recipient = %recipient,
                        timeout_ms = self.send_timeout.as_millis() as u64,
                        "Timed out delivering message"
                    );
                    return Disposition::Reject;
                }
            }
        }

        Disposition::Ack
    }
}

/// Consumer bound to the primary queue
pub struct Consumer {
    session: BrokerSession,
    queue: String,
    fanout: FanOut,
}

impl Consumer {
    /// Connect, declare the topology and limit prefetch
    pub async fn connect(client: &BrokerClient, topology: &Topology, fanout: FanOut) -> BrokerResult<Self> {
        let queue = topology.primary_queue()?.name.clone();
        let session = client.connect(false).await?;

        let prepared = async {
            topology.declare(session.channel()).await?;
            session
                .channel()
                .basic_qos(PREFETCH, BasicQosOptions::default())
                .await
                .map_err(|e| BrokerError::from_lapin(Operation::Consume, e))
        }
        .await;

        if let Err(e) = prepared {
            session.close().await;
            return Err(e);
        }

        Ok(Self {
            session,
            queue,
            fanout,
        })
    }

    /// Consume until shutdown, then close the session
    ///
    /// Returns once shutdown is observed between messages or right after
    /// the in-flight message was requeued.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> BrokerResult<()> {
        let result = self.consume(&mut shutdown).await;
        self.session.close().await;
        info!(queue = %self.queue, "Consumer stopped");
        result
    }

    async fn consume(&self, shutdown: &mut watch::Receiver<bool>) -> BrokerResult<()> {
        let tag = format!("jobwatch-relay-{}", Uuid::new_v4());
        let mut deliveries = self
            .session
            .channel()
            .basic_consume(
                &self.queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::from_lapin(Operation::Consume, e))?;

        info!(queue = %self.queue, consumer_tag = %tag, "Consuming");

        loop {
            let next = tokio::select! {
                biased;
                _ = signalled(shutdown) => return Ok(()),
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(BrokerError::from_lapin(Operation::Consume, e)),
                None => return Err(BrokerError::consume("delivery stream ended")),
            };

            let message_id = delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default();

            let disposition = self
                .fanout
                .process(&delivery.data, &message_id, shutdown)
                .await;
            settle(&delivery, disposition).await?;

            info!(message_id = %message_id, outcome = %disposition, "Message settled");

            if disposition == Disposition::Requeue {
                return Ok(());
            }
        }
    }
}

/// Broker command carrying out a disposition
enum Settlement {
    Ack(BasicAckOptions),
    Nack(BasicNackOptions),
    Reject(BasicRejectOptions),
}

fn settlement(disposition: Disposition) -> Settlement {
    match disposition {
        Disposition::Ack => Settlement::Ack(BasicAckOptions::default()),
        Disposition::Requeue => Settlement::Nack(BasicNackOptions {
            requeue: true,
            ..BasicNackOptions::default()
        }),
        // Dead-lettered, never redelivered
        Disposition::Reject => Settlement::Reject(BasicRejectOptions { requeue: false }),
    }
}

async fn settle(delivery: &Delivery, disposition: Disposition) -> BrokerResult<()> {
    let settled = match settlement(disposition) {
        Settlement::Ack(options) => delivery.acker.ack(options).await,
        Settlement::Nack(options) => delivery.acker.nack(options).await,
        Settlement::Reject(options) => delivery.acker.reject(options).await,
    };

    settled.map_err(|e| BrokerError::from_lapin(Operation::Consume, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_labels() {
        assert_eq!(Disposition::Ack.to_string(), "ack");
        assert_eq!(Disposition::Requeue.as_str(), "requeue");
        assert_eq!(Disposition::Reject.as_str(), "reject");
    }

    #[test]
    fn test_settlement_for_each_disposition() {
        let Settlement::Ack(ack) = settlement(Disposition::Ack) else {
            panic!("ack expected");
        };
        assert!(!ack.multiple);

        let Settlement::Nack(nack) = settlement(Disposition::Requeue) else {
            panic!("nack expected");
        };
        assert!(nack.requeue);
        assert!(!nack.multiple);

        let Settlement::Reject(reject) = settlement(Disposition::Reject) else {
            panic!("reject expected");
        };
        assert!(!reject.requeue);
    }
}
