//! Work queue configuration types.

use std::time::Duration;

use serde::Deserialize;

use super::StorageConfig;

/// Default name of the chat message queue.
pub const DEFAULT_QUEUE_NAME: &str = "chat-messages";
/// Suffix of the side queue that receives poison messages.
pub const POISON_SUFFIX: &str = "-poison";

/// Queue type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueType {
    #[default]
    Memory,
    Sqlite,
    Sqs,
}

/// Work queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue type discriminator.
    #[serde(rename = "type")]
    pub queue_type: QueueType,
    /// Queue name.
    pub name: String,
    /// Connection string. Falls back to `storage.connection` when unset.
    pub connection: Option<String>,
    /// AWS region override for `sqs`.
    pub region: Option<String>,
    /// How long a received message stays hidden before redelivery.
    pub visibility_timeout_secs: u64,
    /// Deliveries allowed before a message is moved to the poison queue.
    pub max_deliveries: u32,
    /// Sleep between empty receives.
    pub poll_interval_ms: u64,
    /// Maximum messages per receive.
    pub batch_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_type: QueueType::default(),
            name: DEFAULT_QUEUE_NAME.to_string(),
            connection: None,
            region: None,
            visibility_timeout_secs: 30,
            max_deliveries: 5,
            poll_interval_ms: 1000,
            batch_size: 16,
        }
    }
}

impl QueueConfig {
    /// Resolve the connection string, sharing the storage connection when
    /// the queue has none of its own.
    pub fn connection_or<'a>(&'a self, storage: &'a StorageConfig) -> &'a str {
        match self.connection.as_deref() {
            Some(connection) if !connection.is_empty() => connection,
            _ => &storage.connection,
        }
    }

    /// Name of the poison queue paired with this queue.
    pub fn poison_name(&self) -> String {
        format!("{}{}", self.name, POISON_SUFFIX)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
