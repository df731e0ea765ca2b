//! Broker-backed delivery channel over librdkafka.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use courier_core::config::BusConfig;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::channel::{DeliveryChannel, DeliveryReceipt, DeliveryReport, InFlight, OutboundMessage};
use crate::error::{ChannelError, DeliveryError};

pub struct KafkaChannel {
    producer: FutureProducer,
    in_flight: Arc<InFlight>,
    capacity: usize,
}

impl KafkaChannel {
    /// SASL_SSL with PLAIN credentials. librdkafka retries are disabled so a
    /// failed delivery surfaces once, to the caller.
    pub fn connect(config: &BusConfig) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", config.api_key.expose_secret())
            .set("sasl.password", config.api_secret.expose_secret())
            .set("message.send.max.retries", "0")
            .set("queue.buffering.max.messages", config.queue_capacity.to_string())
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()?;

        Ok(Self {
            producer,
            in_flight: Arc::new(InFlight::default()),
            capacity: config.queue_capacity.max(1),
        })
    }
}

#[async_trait]
impl DeliveryChannel for KafkaChannel {
    fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, ChannelError> {
        if !self.in_flight.try_begin(self.capacity) {
            return Err(ChannelError::QueueFull);
        }

        let record = FutureRecord::to(&message.topic)
            .key(message.key.as_slice())
            .payload(message.payload.as_slice());

        let delivery = match self.producer.send_result(record) {
            Ok(delivery) => delivery,
            Err((error, _)) => {
                self.in_flight.complete();
                return Err(match error {
                    KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull) => {
                        ChannelError::QueueFull
                    }
                    other => ChannelError::Rejected(other.to_string()),
                });
            }
        };

        let (notifier, receipt) = DeliveryReceipt::pending();
        let in_flight = Arc::clone(&self.in_flight);
        let topic = message.topic;
        tokio::spawn(async move {
            let outcome = match delivery.await {
                Ok(Ok((partition, offset))) => Ok(DeliveryReport { topic, partition, offset }),
                Ok(Err((error, _))) => {
                    warn!(
                        event_name = "bus.kafka.delivery_failed",
                        topic = %topic,
                        error = %error,
                        "broker rejected message"
                    );
                    Err(DeliveryError::Rejected(error.to_string()))
                }
                Err(_) => Err(DeliveryError::Dropped),
            };
            notifier.complete(outcome);
            in_flight.complete();
        });

        Ok(receipt)
    }

    async fn flush(&self, timeout: Duration) -> usize {
        let started = Instant::now();
        let producer = self.producer.clone();
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await;
        match flushed {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(event_name = "bus.kafka.flush", error = %error, "flush incomplete"),
            Err(error) => warn!(event_name = "bus.kafka.flush", error = %error, "flush task failed"),
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        self.in_flight.wait_idle(remaining).await
    }

    async fn close(&self, timeout: Duration) -> usize {
        let outstanding = self.flush(timeout).await;
        debug!(
            event_name = "bus.kafka.closed",
            outstanding,
            queued = self.producer.in_flight_count(),
            "producer drained"
        );
        outstanding
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}
