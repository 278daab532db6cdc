//! Amazon SQS work queue.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Delivery, QueueError, Result, WorkQueue};

/// SQS caps a single receive at ten messages.
const MAX_RECEIVE: usize = 10;

/// SQS implementation of WorkQueue.
pub struct SqsWorkQueue {
    sqs: Client,
    name: String,
    visibility_timeout: Duration,
    /// Queue URL, resolved on first use.
    queue_url: RwLock<Option<String>>,
}

impl SqsWorkQueue {
    /// Create a new SQS work queue.
    ///
    /// An empty `endpoint_url` uses the SDK's default endpoint resolution.
    pub async fn connect(
        endpoint_url: &str,
        region: Option<&str>,
        name: &str,
        visibility_timeout: Duration,
    ) -> Self {
        let mut aws_config_builder =
            aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            aws_config_builder =
                aws_config_builder.region(aws_config::Region::new(region.to_string()));
        }

        if !endpoint_url.is_empty() {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint_url);
        }

        let aws_config = aws_config_builder.load().await;

        info!(
            region = ?region,
            endpoint = %endpoint_url,
            queue = %name,
            "Connected to AWS SQS"
        );

        Self {
            sqs: Client::new(&aws_config),
            name: name.to_string(),
            visibility_timeout,
            queue_url: RwLock::new(None),
        }
    }

    /// Get or create the queue URL.
    async fn queue_url(&self) -> Result<String> {
        {
            let url = self.queue_url.read().await;
            if let Some(url) = url.as_ref() {
                return Ok(url.clone());
            }
        }

        // Create queue (idempotent - returns existing if already exists)
        let result = self
            .sqs
            .create_queue()
            .queue_name(&self.name)
            .attributes(
                QueueAttributeName::VisibilityTimeout,
                self.visibility_timeout.as_secs().to_string(),
            )
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(format!("Failed to create SQS queue: {}", e)))?;

        let url = result
            .queue_url()
            .ok_or_else(|| QueueError::Unavailable("SQS create_queue returned no URL".to_string()))?
            .to_string();

        *self.queue_url.write().await = Some(url.clone());

        info!(queue = %self.name, url = %url, "Created/found SQS queue");
        Ok(url)
    }
}

#[async_trait]
impl WorkQueue for SqsWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_absent(&self) -> Result<()> {
        self.queue_url().await.map(|_| ())
    }

    async fn enqueue(&self, payload: &str) -> Result<()> {
        let queue_url = self.queue_url().await?;
        self.sqs
            .send_message()
            .queue_url(&queue_url)
            .message_body(payload)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(format!("SQS send_message failed: {}", e)))?;
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let queue_url = self.queue_url().await?;
        let output = self
            .sqs
            .receive_message()
            .queue_url(&queue_url)
            .max_number_of_messages(max.clamp(1, MAX_RECEIVE) as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(format!("SQS receive_message failed: {}", e)))?;

        let mut deliveries = Vec::new();
        for message in output.messages.unwrap_or_default() {
            let (Some(receipt), Some(body)) = (message.receipt_handle(), message.body()) else {
                debug!(message_id = ?message.message_id(), "Skipping SQS message without body");
                continue;
            };

            let dequeue_count = message
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);

            deliveries.push(Delivery {
                receipt: receipt.to_string(),
                payload: body.to_string(),
                dequeue_count,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        let queue_url = self.queue_url().await?;
        self.sqs
            .delete_message()
            .queue_url(&queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(format!("SQS delete_message failed: {}", e)))?;
        Ok(())
    }

    async fn release(&self, receipt: &str) -> Result<()> {
        let queue_url = self.queue_url().await?;
        self.sqs
            .change_message_visibility()
            .queue_url(&queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| {
                QueueError::Unavailable(format!("SQS change_message_visibility failed: {}", e))
            })?;
        Ok(())
    }
}
