//! Service wiring.
//!
//! Builds every long-lived handle from configuration once, so binaries and
//! tests construct the same object graph explicitly.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, QueueType};
use crate::producer::MessageGenerator;
use crate::queue::{init_queue, ChatMessageQueue, IngestionWorker, QueueError, WorkQueue};
use crate::repository::ChatMessageRepository;
use crate::storage::{init_storage, StorageError};
use crate::tail::TailReader;
use crate::utils::retry::connection_backoff;

/// Handles shared by the console, the producer and the ingestion worker.
pub struct RelayServices {
    config: Config,
    repository: ChatMessageRepository,
    queue: ChatMessageQueue,
    poison: Arc<dyn WorkQueue>,
}

impl RelayServices {
    /// Connect to the configured backends and create the table and queues
    /// if they do not exist yet.
    pub async fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store = init_storage(&config.storage).await?;
        (|| store.create_if_absent())
            .retry(connection_backoff())
            .when(StorageError::is_transient)
            .notify(|err: &StorageError, dur: Duration| {
                warn!(error = %err, delay = ?dur, "Table store unavailable, retrying");
            })
            .await?;

        let queue = init_queue(&config.queue, &config.storage, &config.queue.name).await?;
        let poison = init_queue(&config.queue, &config.storage, &config.queue.poison_name()).await?;
        for work_queue in [&queue, &poison] {
            (|| work_queue.create_if_absent())
                .retry(connection_backoff())
                .when(QueueError::is_transient)
                .notify(|err: &QueueError, dur: Duration| {
                    warn!(queue = %work_queue.name(), error = %err, delay = ?dur, "Queue unavailable, retrying");
                })
                .await?;
        }

        info!(
            table = %config.storage.table,
            queue = %queue.name(),
            poison_queue = %poison.name(),
            "Relay services ready"
        );

        Ok(Self {
            config: config.clone(),
            repository: ChatMessageRepository::new(store),
            queue: ChatMessageQueue::new(queue),
            poison,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &ChatMessageRepository {
        &self.repository
    }

    pub fn queue(&self) -> &ChatMessageQueue {
        &self.queue
    }

    /// Whether the ingestion worker must run inside the console process.
    ///
    /// A memory queue is only reachable from the process that created it.
    pub fn runs_ingestion_in_process(&self) -> bool {
        self.config.queue.queue_type == QueueType::Memory
    }

    pub fn ingestion_worker(&self) -> IngestionWorker {
        IngestionWorker::new(
            self.repository.clone(),
            Arc::clone(self.queue.queue()),
            Arc::clone(&self.poison),
        )
        .with_max_deliveries(self.config.queue.max_deliveries)
        .with_batch_size(self.config.queue.batch_size)
        .with_poll_interval(self.config.queue.poll_interval())
    }

    pub fn tail_reader(&self, channel_id: Uuid) -> TailReader {
        TailReader::from_config(self.repository.clone(), channel_id, &self.config.tail)
    }

    pub fn message_generator(&self, channel_id: Uuid) -> MessageGenerator {
        MessageGenerator::new(channel_id, &self.config.producer)
    }
}
