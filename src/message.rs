//! Chat message value type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving channel ids from channel names.
const CHANNEL_NAMESPACE: Uuid = Uuid::from_u128(0x6c0e_2f3a_8d1b_4c7e_9a55_0b3f_d2e1_7a90);

/// A single chat message.
///
/// Messages are immutable once created. `message_id` is assigned by the
/// producer and must be unique within a channel; it breaks ordering ties
/// between messages sent at the same instant and is the cursor identity
/// used when tailing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub channel_id: Uuid,
    pub message_id: Uuid,
    pub author: String,
    pub sent_at: DateTime<Utc>,
    pub body: String,
}

impl ChatMessage {
    /// Create a message stamped with the current time and a fresh id.
    pub fn new(channel_id: Uuid, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self::at(channel_id, Uuid::new_v4(), Utc::now(), author, body)
    }

    /// Create a message with an explicit id and timestamp.
    pub fn at(
        channel_id: Uuid,
        message_id: Uuid,
        sent_at: DateTime<Utc>,
        author: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            channel_id,
            message_id,
            author: author.into(),
            sent_at,
            body: body.into(),
        }
    }
}

/// Derive a stable channel id from a human-readable channel name.
///
/// The same name always maps to the same id (UUIDv5), so every console
/// that joins "general" lands in the same partition.
pub fn channel_id_for_name(name: &str) -> Uuid {
    Uuid::new_v5(&CHANNEL_NAMESPACE, name.trim().as_bytes())
}
