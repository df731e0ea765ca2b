use std::sync::Arc;
use std::time::Duration;

use courier_core::config::{AppConfig, BusTransport, RegistryMode, TopicConfig};
use tracing::info;

use crate::channel::DeliveryChannel;
use crate::error::PublishError;
use crate::memory::{InMemoryChannel, MemoryChannelOptions};
use crate::publisher::ResultPublisher;
use crate::registry::{HttpSchemaRegistry, InMemorySchemaRegistry, SchemaRegistry, SchemaResolver};

/// Long-lived publishing resources: one schema resolver and one delivery
/// channel per process, shared by every invocation until `shutdown`.
pub struct PublisherContext {
    resolver: Arc<SchemaResolver>,
    channel: Arc<dyn DeliveryChannel>,
    publisher: ResultPublisher,
}

impl PublisherContext {
    /// Must run inside a Tokio runtime; channels start background tasks.
    pub fn connect(config: &AppConfig) -> Result<Self, PublishError> {
        let registry: Arc<dyn SchemaRegistry> = match config.registry.mode {
            RegistryMode::Http => Arc::new(HttpSchemaRegistry::from_config(&config.registry)?),
            RegistryMode::Memory => Arc::new(InMemorySchemaRegistry::new()),
        };
        let channel = connect_channel(config)?;

        info!(
            event_name = "bus.context.connected",
            correlation_id = "bootstrap",
            registry = registry.name(),
            transport = channel.name(),
            "publisher context ready"
        );

        Ok(Self::from_parts(
            registry,
            channel,
            config.topics.clone(),
            Duration::from_millis(config.bus.flush_timeout_ms),
        ))
    }

    pub fn from_parts(
        registry: Arc<dyn SchemaRegistry>,
        channel: Arc<dyn DeliveryChannel>,
        topics: TopicConfig,
        flush_timeout: Duration,
    ) -> Self {
        let resolver = Arc::new(SchemaResolver::new(registry));
        let publisher =
            ResultPublisher::new(Arc::clone(&resolver), Arc::clone(&channel), topics, flush_timeout);
        Self { resolver, channel, publisher }
    }

    pub fn publisher(&self) -> &ResultPublisher {
        &self.publisher
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    pub fn channel(&self) -> &Arc<dyn DeliveryChannel> {
        &self.channel
    }

    /// Drains the channel and stops it. Returns sends still unacknowledged.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let outstanding = self.channel.close(timeout).await;
        info!(
            event_name = "bus.context.shutdown",
            correlation_id = "shutdown",
            outstanding,
            "publisher context closed"
        );
        outstanding
    }
}

fn connect_channel(config: &AppConfig) -> Result<Arc<dyn DeliveryChannel>, PublishError> {
    match config.bus.transport {
        BusTransport::Memory => {
            Ok(Arc::new(InMemoryChannel::new(MemoryChannelOptions::from_config(&config.bus))))
        }
        #[cfg(feature = "kafka")]
        BusTransport::Kafka => crate::kafka::KafkaChannel::connect(&config.bus)
            .map(|channel| Arc::new(channel) as Arc<dyn DeliveryChannel>)
            .map_err(|error| PublishError::Configuration(format!("kafka producer: {error}"))),
        #[cfg(not(feature = "kafka"))]
        BusTransport::Kafka => Err(PublishError::Configuration(
            "bus.transport = kafka requires building with the `kafka` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use courier_core::config::{AppConfig, BusTransport, RegistryMode, TopicConfig};
    use courier_core::inbound::EventBatch;
    use courier_core::records::SearchContextResult;
    use serde_json::json;

    use super::PublisherContext;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.registry.mode = RegistryMode::Memory;
        config.bus.transport = BusTransport::Memory;
        config.topics =
            TopicConfig { search_result: Some("search-results".to_string()), ..TopicConfig::default() };
        config
    }

    #[tokio::test]
    async fn memory_context_publishes_and_shuts_down_clean() {
        let context = PublisherContext::connect(&memory_config()).expect("memory context connects");
        let batch = EventBatch::from_values([json!({
            "message_id": "m1",
            "employee_id": "E001",
            "query": "dept?",
        })]);
        let fields = batch.0[0].fields().expect("object payload");
        let record = SearchContextResult::from_event(fields, None, 1).into();

        let receipt = context.publisher().publish(&record).await.expect("publish succeeds");

        assert_eq!(receipt.topic, "search-results");
        assert_eq!(context.resolver().cached_subjects().await, vec!["search-results-value".to_string()]);
        assert_eq!(context.shutdown(Duration::from_secs(1)).await, 0);
        assert!(context.publisher().publish(&record).await.is_err());
    }

    #[cfg(not(feature = "kafka"))]
    #[tokio::test]
    async fn kafka_transport_needs_the_feature() {
        let mut config = memory_config();
        config.bus.transport = BusTransport::Kafka;

        let error = PublisherContext::connect(&config).err().expect("kafka unavailable");

        assert!(error.to_string().contains("kafka"));
    }
}
