//! Producer side of the chat message queue.

use std::sync::Arc;

use base64::prelude::*;
use tracing::debug;

use super::{QueueError, Result, WorkQueue};
use crate::message::ChatMessage;

/// Serialize a message as camelCase JSON, then Base64.
pub fn encode_payload(message: &ChatMessage) -> Result<String> {
    let json = serde_json::to_vec(message).map_err(|e| QueueError::Encode(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(json))
}

/// Inverse of [`encode_payload`].
pub fn decode_payload(payload: &str) -> Result<ChatMessage> {
    let json = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| QueueError::Decode(format!("base64: {}", e)))?;
    serde_json::from_slice(&json).map_err(|e| QueueError::Decode(format!("json: {}", e)))
}

/// Enqueues chat messages for ingestion.
#[derive(Clone)]
pub struct ChatMessageQueue {
    queue: Arc<dyn WorkQueue>,
}

impl ChatMessageQueue {
    pub fn new(queue: Arc<dyn WorkQueue>) -> Self {
        Self { queue }
    }

    /// Underlying work queue.
    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    /// Submit a message. Once this returns `Ok` the message will be
    /// delivered to an ingestion worker at least once.
    pub async fn enqueue(&self, message: &ChatMessage) -> Result<()> {
        let payload = encode_payload(message)?;
        self.queue.enqueue(&payload).await?;
        debug!(
            queue = %self.queue.name(),
            channel = %message.channel_id,
            message_id = %message.message_id,
            "Enqueued chat message"
        );
        Ok(())
    }
}
