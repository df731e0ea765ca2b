use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::config::BusConfig;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::{
    DeliveryChannel, DeliveryNotifier, DeliveryOutcome, DeliveryReceipt, DeliveryReport, InFlight,
    OutboundMessage,
};
use crate::error::{ChannelError, DeliveryError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryBehavior {
    Accept,
    RejectAll(String),
}

#[derive(Clone, Debug)]
pub struct MemoryChannelOptions {
    pub capacity: usize,
    pub partitions: u32,
    pub ack_delay: Duration,
    pub behavior: MemoryBehavior,
}

impl Default for MemoryChannelOptions {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            partitions: 6,
            ack_delay: Duration::ZERO,
            behavior: MemoryBehavior::Accept,
        }
    }
}

impl MemoryChannelOptions {
    pub fn from_config(config: &BusConfig) -> Self {
        Self {
            capacity: config.queue_capacity,
            partitions: config.memory_partitions,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

type TopicLog = HashMap<String, Vec<Vec<StoredMessage>>>;

struct Queued {
    message: OutboundMessage,
    notifier: DeliveryNotifier,
}

/// Partitioned in-process bus. Acknowledgements are produced by a background
/// task, so the channel must be created inside a Tokio runtime.
pub struct InMemoryChannel {
    sender: Mutex<Option<mpsc::Sender<Queued>>>,
    in_flight: Arc<InFlight>,
    log: Arc<Mutex<TopicLog>>,
    capacity: usize,
    sends: AtomicUsize,
}

impl InMemoryChannel {
    pub fn new(options: MemoryChannelOptions) -> Self {
        let capacity = options.capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let in_flight = Arc::new(InFlight::default());
        let log = Arc::new(Mutex::new(TopicLog::new()));

        tokio::spawn(acknowledge(receiver, options, Arc::clone(&log), Arc::clone(&in_flight)));

        Self { sender: Mutex::new(Some(sender)), in_flight, log, capacity, sends: AtomicUsize::new(0) }
    }

    /// Every send attempt, accepted or not.
    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::Relaxed)
    }

    /// Messages delivered to `topic`, ordered by partition then offset.
    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.get(topic).map(|partitions| partitions.iter().flatten().cloned().collect()).unwrap_or_default()
    }
}

#[async_trait]
impl DeliveryChannel for InMemoryChannel {
    fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, ChannelError> {
        self.sends.fetch_add(1, Ordering::Relaxed);

        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(ChannelError::Closed);
        };
        if !self.in_flight.try_begin(self.capacity) {
            return Err(ChannelError::QueueFull);
        }

        let (notifier, receipt) = DeliveryReceipt::pending();
        match sender.try_send(Queued { message, notifier }) {
            Ok(()) => Ok(receipt),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.in_flight.complete();
                Err(ChannelError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.in_flight.complete();
                Err(ChannelError::Closed)
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> usize {
        self.in_flight.wait_idle(timeout).await
    }

    async fn close(&self, timeout: Duration) -> usize {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.in_flight.wait_idle(timeout).await
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

async fn acknowledge(
    mut receiver: mpsc::Receiver<Queued>,
    options: MemoryChannelOptions,
    log: Arc<Mutex<TopicLog>>,
    in_flight: Arc<InFlight>,
) {
    let partitions = options.partitions.max(1);
    while let Some(Queued { message, notifier }) = receiver.recv().await {
        if !options.ack_delay.is_zero() {
            tokio::time::sleep(options.ack_delay).await;
        }

        let outcome: DeliveryOutcome = match &options.behavior {
            MemoryBehavior::Accept => Ok(append(&log, message, partitions)),
            MemoryBehavior::RejectAll(reason) => Err(DeliveryError::Rejected(reason.clone())),
        };
        debug!(event_name = "bus.memory.ack", accepted = outcome.is_ok(), "memory bus acknowledged send");

        notifier.complete(outcome);
        in_flight.complete();
    }
}

fn append(log: &Mutex<TopicLog>, message: OutboundMessage, partitions: u32) -> DeliveryReport {
    let mut hasher = DefaultHasher::new();
    message.key.hash(&mut hasher);
    let partition = (hasher.finish() % u64::from(partitions)) as usize;

    let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
    let topic_log = log
        .entry(message.topic.clone())
        .or_insert_with(|| (0..partitions).map(|_| Vec::new()).collect());
    let entries = &mut topic_log[partition];
    let offset = entries.len() as i64;

    entries.push(StoredMessage {
        topic: message.topic.clone(),
        partition: partition as i32,
        offset,
        key: message.key,
        payload: message.payload,
    });

    DeliveryReport { topic: message.topic, partition: partition as i32, offset }
}
