//! Work queue abstraction and chat message ingestion.
//!
//! A work queue delivers each payload at least once. A received message is
//! hidden for a visibility timeout; if it is not acknowledged in time it is
//! delivered again with a higher dequeue count. [`ChatMessageQueue`] is the
//! producer side for chat messages and [`IngestionWorker`] the consumer side
//! that appends them to the chat log.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{QueueConfig, QueueType, StorageConfig};

mod gateway;
mod ingest;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqs")]
pub mod sqs;

pub use gateway::{decode_payload, encode_payload, ChatMessageQueue};
pub use ingest::{IngestError, IngestOutcome, IngestionWorker};
pub use memory::MemoryWorkQueue;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteWorkQueue;

#[cfg(feature = "sqs")]
pub use sqs::SqsWorkQueue;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur during queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown or expired receipt: {0}")]
    UnknownReceipt(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Failed to decode payload: {0}")]
    Decode(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QueueError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::Unavailable(_) => true,
            #[cfg(feature = "sqlite")]
            QueueError::Database(_) => true,
            _ => false,
        }
    }
}

/// A received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle for `ack`/`release`. Only valid for this delivery.
    pub receipt: String,
    /// The enqueued payload, unchanged.
    pub payload: String,
    /// How many times the message has been delivered, this one included.
    pub dequeue_count: u32,
}

/// Interface for at-least-once work queues.
///
/// Implementations:
/// - `MemoryWorkQueue`: In-process queue
/// - `SqliteWorkQueue`: Queue table shared between processes
/// - `SqsWorkQueue`: Amazon SQS
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Queue name.
    fn name(&self) -> &str;

    /// Create the queue if it does not exist. Idempotent.
    async fn create_if_absent(&self) -> Result<()>;

    /// Submit a payload.
    async fn enqueue(&self, payload: &str) -> Result<()>;

    /// Receive up to `max` visible messages.
    ///
    /// Each returned message is hidden for the visibility timeout and its
    /// dequeue count is incremented.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Delete a delivered message.
    async fn ack(&self, receipt: &str) -> Result<()>;

    /// Make a delivered message visible again immediately.
    async fn release(&self, receipt: &str) -> Result<()>;
}

/// Initialize a work queue named `name` based on configuration.
///
/// Memory queues are process-local, so callers must share the returned
/// handle between producer and consumer.
pub async fn init_queue(
    config: &QueueConfig,
    storage: &StorageConfig,
    name: &str,
) -> std::result::Result<Arc<dyn WorkQueue>, Box<dyn std::error::Error>> {
    info!(queue_type = ?config.queue_type, queue = %name, "Queue");

    match config.queue_type {
        QueueType::Memory => Ok(Arc::new(MemoryWorkQueue::new(
            name,
            config.visibility_timeout(),
        ))),
        #[cfg(feature = "sqlite")]
        QueueType::Sqlite => {
            let pool = crate::storage::sqlite::connect(config.connection_or(storage)).await?;
            Ok(Arc::new(SqliteWorkQueue::new(
                pool,
                name,
                config.visibility_timeout(),
            )))
        }
        #[cfg(not(feature = "sqlite"))]
        QueueType::Sqlite => {
            let _ = storage;
            error!("SQLite queue requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        #[cfg(feature = "sqs")]
        QueueType::Sqs => {
            let queue = SqsWorkQueue::connect(
                config.connection.as_deref().unwrap_or_default(),
                config.region.as_deref(),
                name,
                config.visibility_timeout(),
            )
            .await;
            Ok(Arc::new(queue))
        }
        #[cfg(not(feature = "sqs"))]
        QueueType::Sqs => {
            error!("SQS queue requested but 'sqs' feature is not enabled");
            Err("SQS feature not enabled".into())
        }
    }
}
