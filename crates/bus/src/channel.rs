//! Delivery channel contract shared by the broker producer and the in-memory bus.
//!
//! `send` only enqueues. Acknowledgement arrives later on the receipt, and
//! `flush` is the single point where a caller waits for outstanding sends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use crate::error::{ChannelError, DeliveryError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

pub type DeliveryOutcome = Result<DeliveryReport, DeliveryError>;

/// Completion side of a send; the channel resolves it exactly once.
#[derive(Debug)]
pub struct DeliveryNotifier(oneshot::Sender<DeliveryOutcome>);

impl DeliveryNotifier {
    pub fn complete(self, outcome: DeliveryOutcome) {
        // The caller may have stopped waiting.
        let _ = self.0.send(outcome);
    }
}

#[derive(Debug)]
pub struct DeliveryReceipt {
    outcome: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryReceipt {
    pub fn pending() -> (DeliveryNotifier, DeliveryReceipt) {
        let (sender, receiver) = oneshot::channel();
        (DeliveryNotifier(sender), DeliveryReceipt { outcome: receiver })
    }

    /// Outcome if the channel has already reported, `None` while still in flight.
    pub fn try_outcome(&mut self) -> Option<DeliveryOutcome> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DeliveryError::Dropped)),
        }
    }

    pub async fn wait(self) -> DeliveryOutcome {
        self.outcome.await.unwrap_or(Err(DeliveryError::Dropped))
    }
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Enqueues without blocking. Safe to call from many tasks at once.
    fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, ChannelError>;

    /// Waits up to `timeout` for every enqueued send to be acknowledged and
    /// returns how many are still outstanding.
    async fn flush(&self, timeout: Duration) -> usize;

    /// Stops accepting sends and drains within `timeout`.
    async fn close(&self, timeout: Duration) -> usize;

    fn name(&self) -> &'static str;
}

/// Counts sends between enqueue and delivery report.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    pending: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    /// Reserves a slot unless `capacity` sends are already outstanding.
    pub(crate) fn try_begin(&self, capacity: usize) -> bool {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                (pending < capacity).then_some(pending + 1)
            })
            .is_ok()
    }

    pub(crate) fn complete(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) async fn wait_idle(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return 0;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.outstanding();
            }
        }
    }
}
