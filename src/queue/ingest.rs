//! Consumer side of the chat message queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{decode_payload, Delivery, QueueError, WorkQueue};
use crate::repository::ChatMessageRepository;

/// Errors that stop a delivery from being settled.
///
/// Store failures are not errors here: the delivery is left for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended and acknowledged.
    Stored,
    /// Already in the log from an earlier delivery; acknowledged.
    AlreadyStored,
    /// Moved to the poison queue and acknowledged.
    Poisoned,
    /// Left unacknowledged; the queue redelivers it after the visibility
    /// timeout.
    Retry,
}

/// Drains the chat message queue into the chat log.
///
/// Delivery is at least once and `append` is insert-only, so a redelivered
/// message hits `DuplicateKey` and is acknowledged without a second record.
pub struct IngestionWorker {
    repository: ChatMessageRepository,
    queue: Arc<dyn WorkQueue>,
    poison: Arc<dyn WorkQueue>,
    max_deliveries: u32,
    batch_size: usize,
    poll_interval: Duration,
}

impl IngestionWorker {
    pub fn new(
        repository: ChatMessageRepository,
        queue: Arc<dyn WorkQueue>,
        poison: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            repository,
            queue,
            poison,
            max_deliveries: 5,
            batch_size: 16,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Settle one delivery.
    pub async fn handle(&self, delivery: &Delivery) -> Result<IngestOutcome, IngestError> {
        if delivery.dequeue_count > self.max_deliveries {
            let reason = format!(
                "delivered {} times, limit {}",
                delivery.dequeue_count, self.max_deliveries
            );
            return self.poison(delivery, &reason).await;
        }

        let message = match decode_payload(&delivery.payload) {
            Ok(message) => message,
            Err(e) => return self.poison(delivery, &e.to_string()).await,
        };

        match self.repository.append(&message).await {
            Ok(()) => {
                self.queue.ack(&delivery.receipt).await?;
                info!(
                    "[{}|{}] {}: {}",
                    message.channel_id,
                    message.sent_at.format("%Y-%m-%dT%H:%M:%S"),
                    message.author,
                    message.body
                );
                Ok(IngestOutcome::Stored)
            }
            Err(e) if e.is_conflict() => {
                self.queue.ack(&delivery.receipt).await?;
                debug!(message_id = %message.message_id, "Chat message already stored");
                Ok(IngestOutcome::AlreadyStored)
            }
            Err(e) => {
                warn!(
                    message_id = %message.message_id,
                    dequeue_count = delivery.dequeue_count,
                    error = %e,
                    "Append failed, message will be retried after visibility timeout"
                );
                Ok(IngestOutcome::Retry)
            }
        }
    }

    async fn poison(&self, delivery: &Delivery, reason: &str) -> Result<IngestOutcome, IngestError> {
        error!(
            queue = %self.queue.name(),
            poison_queue = %self.poison.name(),
            dequeue_count = delivery.dequeue_count,
            reason = %reason,
            "Moving message to poison queue"
        );
        self.poison.enqueue(&delivery.payload).await?;
        self.queue.ack(&delivery.receipt).await?;
        Ok(IngestOutcome::Poisoned)
    }

    /// Receive one batch and settle every delivery in it.
    ///
    /// Returns the number of deliveries received. A delivery that cannot be
    /// settled is logged and left for redelivery.
    pub async fn poll_once(&self) -> Result<usize, IngestError> {
        let deliveries = self.queue.receive(self.batch_size).await?;
        for delivery in &deliveries {
            if let Err(e) = self.handle(delivery).await {
                warn!(error = %e, "Failed to settle delivery");
            }
        }
        Ok(deliveries.len())
    }

    /// Drain the queue until `token` is cancelled.
    ///
    /// Full batches are followed immediately by the next receive; otherwise
    /// the worker sleeps the poll interval. A batch in progress always
    /// completes before cancellation is observed.
    pub async fn run(&self, token: CancellationToken) {
        info!(queue = %self.queue.name(), "Starting ingestion worker");

        while !token.is_cancelled() {
            let idle = match self.poll_once().await {
                Ok(received) => received < self.batch_size,
                Err(e) => {
                    warn!(queue = %self.queue.name(), error = %e, "Failed to receive messages");
                    true
                }
            };

            if idle {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(queue = %self.queue.name(), "Ingestion worker stopped");
    }
}
