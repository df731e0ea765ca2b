use std::sync::Arc;
use std::time::Duration;

use courier_core::config::TopicConfig;
use courier_core::records::{RecordKind, ResultRecord};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::channel::{DeliveryChannel, OutboundMessage};
use crate::encoder::RecordEncoder;
use crate::error::{DeliveryError, PublishError};
use crate::registry::SchemaResolver;

/// Confirmation that a result reached the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublishReceipt {
    pub key: String,
    pub message_id: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Encodes a record against its registered schema and sends it under a fresh
/// random key, then waits for the channel to confirm. Nothing is retried.
///
/// The flush after each send drains the whole channel, not just this record.
/// With other publishes in flight on the same channel, a call whose own
/// receipt already resolved can still wait up to `flush_timeout`.
pub struct ResultPublisher {
    resolver: Arc<SchemaResolver>,
    channel: Arc<dyn DeliveryChannel>,
    topics: TopicConfig,
    flush_timeout: Duration,
}

impl ResultPublisher {
    pub fn new(
        resolver: Arc<SchemaResolver>,
        channel: Arc<dyn DeliveryChannel>,
        topics: TopicConfig,
        flush_timeout: Duration,
    ) -> Self {
        Self { resolver, channel, topics, flush_timeout }
    }

    pub fn topic_for(&self, kind: RecordKind) -> Result<&str, PublishError> {
        let topic = self.topics.for_kind(kind).ok_or_else(|| {
            PublishError::Configuration(format!("no topic configured for {} results", kind.as_str()))
        })?;
        if let Some(other) = self.topics.shared_with(kind) {
            return Err(PublishError::Configuration(format!(
                "topic `{topic}` is configured for both {} and {} results",
                kind.as_str(),
                other.as_str()
            )));
        }
        Ok(topic)
    }

    pub async fn encoder_for(&self, kind: RecordKind) -> Result<RecordEncoder, PublishError> {
        let topic = self.topic_for(kind)?;
        let schema = self.resolver.resolve_for_topic(kind, topic).await?;
        Ok(RecordEncoder::new(schema))
    }

    pub async fn publish(&self, record: &ResultRecord) -> Result<PublishReceipt, PublishError> {
        let kind = record.kind();
        let message_id = record.message_id().to_string();

        let result = self.publish_inner(record).await;
        match &result {
            Ok(receipt) => info!(
                event_name = "bus.publish.delivered",
                correlation_id = %message_id,
                record_kind = kind.as_str(),
                topic = %receipt.topic,
                delivery_key = %receipt.key,
                partition = receipt.partition,
                offset = receipt.offset,
                "result published"
            ),
            Err(error) => warn!(
                event_name = "bus.publish.failed",
                correlation_id = %message_id,
                record_kind = kind.as_str(),
                failure_class = error.class().as_str(),
                error = %error,
                "result publish failed"
            ),
        }
        result
    }

    async fn publish_inner(&self, record: &ResultRecord) -> Result<PublishReceipt, PublishError> {
        let kind = record.kind();
        let topic = self.topic_for(kind)?.to_string();
        let key = Uuid::new_v4().to_string();

        let encoder = self.encoder_for(kind).await?;
        let payload = encoder.encode(record)?;

        let mut receipt =
            self.channel.send(OutboundMessage { topic, key: key.clone().into_bytes(), payload })?;

        let outstanding = self.channel.flush(self.flush_timeout).await;
        match receipt.try_outcome() {
            Some(Ok(report)) => Ok(PublishReceipt {
                key,
                message_id: record.message_id().to_string(),
                topic: report.topic,
                partition: report.partition,
                offset: report.offset,
            }),
            Some(Err(DeliveryError::Rejected(reason))) => Err(PublishError::DeliveryFailed(reason)),
            Some(Err(error @ DeliveryError::Dropped)) => {
                Err(PublishError::DeliveryFailed(error.to_string()))
            }
            None => Err(PublishError::PublishTimeout { outstanding: outstanding.max(1) }),
        }
    }
}
