use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::future::Future;
use std::time::Duration;

/// Hard bound on messages acked in one drain. The remainder stays queued
/// and is delivered on the next connect.
pub const DRAIN_MAX_MESSAGES: u64 = 1024;

const CONSUMER_TAG: &str = "offline-drain";

/// A record pulled from a recipient's offline queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable per-recipient FIFO queues over AMQP 0-9-1. One connection, one
/// shared publish channel; each drain borrows its own channel so a consumer
/// failure cannot poison the publish path.
pub struct MessageBroker {
    conn: Connection,
    channel: Channel,
}

impl MessageBroker {
    pub async fn connect(url: &str) -> AppResult<Self> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        tracing::info!("broker connection established");
        Ok(Self { conn, channel })
    }

    pub fn queue_for(username: &str) -> String {
        format!("chat_queue_{username}")
    }

    fn durable_queue_options() -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: true,
            ..Default::default()
        }
    }

    /// Publishes one message onto the recipient's offline queue. The queue
    /// is declared idempotently so a recipient who has never connected
    /// still gets a durable backlog.
    pub async fn publish(
        &self,
        recipient_username: &str,
        sender_username: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> AppResult<()> {
        let queue = Self::queue_for(recipient_username);

        self.channel
            .queue_declare(&queue, Self::durable_queue_options(), FieldTable::default())
            .await?;

        let mut headers = FieldTable::default();
        headers.insert("sender".into(), AMQPValue::LongString(sender_username.into()));

        let properties = BasicProperties::default()
            .with_content_type("text/plain".into())
            .with_timestamp(timestamp.timestamp() as u64)
            .with_headers(headers);

        self.channel
            .basic_publish(
                "",
                &queue,
                BasicPublishOptions::default(),
                content.as_bytes(),
                properties,
            )
            .await?
            .await?;

        Ok(())
    }

    /// Current depth of a queue. Declares the queue (idempotent) and reads
    /// the message count from the declare-ok.
    pub async fn depth(&self, queue: &str) -> AppResult<u32> {
        let queue = self
            .channel
            .queue_declare(queue, Self::durable_queue_options(), FieldTable::default())
            .await?;

        Ok(queue.message_count())
    }

    /// Pulls messages off the queue and feeds them to the handler, acking
    /// each success and nack-requeueing on failure. The loop ends when the
    /// depth monitor observes the queue empty for one poll interval, when
    /// the handler fails, or at [`DRAIN_MAX_MESSAGES`]. Returns the number
    /// of messages acked.
    pub async fn drain<F, Fut>(
        &self,
        queue: &str,
        poll_interval: Duration,
        mut handler: F,
    ) -> AppResult<u64>
    where
        F: FnMut(InboundMessage) -> Fut,
        Fut: Future<Output = AppResult<()>>,
    {
        let channel = self.conn.create_channel().await?;
        channel
            .queue_declare(queue, Self::durable_queue_options(), FieldTable::default())
            .await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let mut consumer = channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let mut acked = 0u64;
        let mut poll = tokio::time::interval(poll_interval);
        poll.tick().await;

        loop {
            if acked >= DRAIN_MAX_MESSAGES {
                tracing::warn!(queue, acked, "drain bound reached, leaving remainder queued");
                break;
            }

            tokio::select! {
                // Pending deliveries win over the depth poll.
                biased;

                delivery = consumer.next() => {
                    let Some(delivery) = delivery else { break };
                    let delivery = delivery?;

                    let message = decode_parts(
                        delivery.properties.headers().as_ref(),
                        *delivery.properties.timestamp(),
                        &delivery.data,
                    );

                    match handler(message).await {
                        Ok(()) => {
                            delivery.ack(BasicAckOptions::default()).await?;
                            acked += 1;
                        }
                        Err(e) => {
                            tracing::warn!(queue, error = %e, "drain handler failed, requeueing");
                            delivery
                                .nack(BasicNackOptions {
                                    requeue: true,
                                    ..Default::default()
                                })
                                .await?;
                            break;
                        }
                    }
                }

                _ = poll.tick() => {
                    let depth = self.depth(queue).await?;
                    if depth == 0 {
                        break;
                    }
                }
            }
        }

        let _ = channel
            .basic_cancel(CONSUMER_TAG, BasicCancelOptions::default())
            .await;
        let _ = channel.close(200, "drain complete").await;

        Ok(acked)
    }
}

/// Decodes a delivery's wire pieces into an [`InboundMessage`]. A missing
/// sender header or timestamp degrades to empty/epoch rather than dropping
/// the message.
fn decode_parts(
    headers: Option<&FieldTable>,
    timestamp: Option<u64>,
    data: &[u8],
) -> InboundMessage {
    let sender = headers
        .and_then(|h| h.inner().get(&ShortString::from("sender")))
        .and_then(|v| match v {
            AMQPValue::LongString(s) => Some(s.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let timestamp = timestamp
        .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch"));

    InboundMessage {
        sender,
        content: String::from_utf8_lossy(data).into_owned(),
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_naming_is_by_username() {
        assert_eq!(MessageBroker::queue_for("bob"), "chat_queue_bob");
    }

    #[test]
    fn decode_parts_reads_sender_header_and_timestamp() {
        let mut headers = FieldTable::default();
        headers.insert("sender".into(), AMQPValue::LongString("alice".into()));

        let message = decode_parts(Some(&headers), Some(1_700_000_000), b"hi");
        assert_eq!(message.sender, "alice");
        assert_eq!(message.content, "hi");
        assert_eq!(message.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn decode_parts_tolerates_missing_metadata() {
        let message = decode_parts(None, None, b"payload");
        assert_eq!(message.sender, "");
        assert_eq!(message.content, "payload");
        assert_eq!(message.timestamp.timestamp(), 0);
    }
}
