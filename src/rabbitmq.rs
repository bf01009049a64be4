//! RabbitMQ plumbing shared by the `resolve` and `fetch` binaries.
//!
//! `resolve` filters and deduplicates index entries and publishes them in
//! batches; `fetch` consumes those batches, downloads the underlying WARC
//! ranges and extracts documents. This mirrors the teacher's
//! batcher/worker hand-off, generalized to the index-entry batches this
//! spec's component A/C produce instead of raw CDX lines.

use anyhow::{Context, Result};
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, Queue};
use serde::Serialize;

/// Queue carrying batches of deduplicated, filtered `IndexEntry`s from
/// `resolve` to `fetch`.
pub const CC_QUEUE_NAME_INDEX_BATCHES: &str = "cc_index_batches";

/// Default number of index entries per published batch, matching the
/// teacher's `BATCH_SIZE`.
pub const BATCH_SIZE: usize = 1000;

/// Default AMQP broker address, overridable via each binary's
/// `--amqp-addr` flag. Spec §6: "no environment variables are consulted
/// by the core," so this is never read from the process environment.
pub const DEFAULT_AMQP_ADDR: &str = "amqp://127.0.0.1:5672/%2f";

pub async fn rabbitmq_connection(addr: &str) -> Result<Connection> {
    Connection::connect(addr, ConnectionProperties::default())
        .await
        .with_context(|| format!("Failed to connect to RabbitMQ at {}", addr))
}

pub async fn rabbitmq_channel_with_queue(
    conn: &Connection,
    queue_name: &str,
) -> Result<(Channel, Queue)> {
    let channel = conn.create_channel().await?;
    let queue = channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok((channel, queue))
}

pub async fn rabbitmq_consumer(
    channel: &Channel,
    queue_name: &str,
    consumer_tag: &str,
) -> Result<Consumer> {
    let consumer = channel
        .basic_consume(
            queue_name,
            consumer_tag,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(consumer)
}

pub async fn publish<T: Serialize>(channel: &Channel, queue_name: &str, item: &T) -> Result<()> {
    let payload = serde_json::to_vec(item)?;
    channel
        .basic_publish(
            "",
            queue_name,
            BasicPublishOptions::default(),
            &payload,
            BasicProperties::default().with_delivery_mode(2),
        )
        .await?
        .await?;
    Ok(())
}

/// Publishes a slice of items as a single message, the way the teacher's
/// `publish_batch` groups a chunk of CDX entries into one delivery.
pub async fn publish_batch<T: Serialize>(channel: &Channel, queue_name: &str, items: &[T]) {
    if let Err(e) = publish(channel, queue_name, &items).await {
        tracing::warn!("Failed to publish batch of {} items: {}", items.len(), e);
    }
}

/// Acknowledges a delivery, logging (rather than propagating) failure,
/// since a failed ack should not abort an otherwise successful batch.
pub async fn ack_quietly(delivery: &lapin::message::Delivery) {
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        tracing::warn!("Failed to ack delivery: {}", e);
    }
}
