//! In-process work queue.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use super::{Delivery, QueueError, Result, WorkQueue};

struct Entry {
    payload: String,
    visible_at: Instant,
    dequeue_count: u32,
    receipt: Option<String>,
}

/// Work queue held in memory, FIFO by enqueue order among visible messages.
///
/// Uses tokio's clock, so tests can drive visibility timeouts with
/// `tokio::time::pause` and `advance`.
pub struct MemoryWorkQueue {
    name: String,
    visibility_timeout: Duration,
    entries: Mutex<Vec<Entry>>,
    fail_on_enqueue: RwLock<bool>,
}

impl MemoryWorkQueue {
    pub fn new(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            entries: Mutex::new(Vec::new()),
            fail_on_enqueue: RwLock::new(false),
        }
    }

    pub async fn set_fail_on_enqueue(&self, fail: bool) {
        *self.fail_on_enqueue.write().await = fail;
    }

    /// Messages not yet acknowledged, visible or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Payloads not yet acknowledged, in enqueue order.
    pub async fn payloads(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.payload.clone())
            .collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_if_absent(&self) -> Result<()> {
        Ok(())
    }

    async fn enqueue(&self, payload: &str) -> Result<()> {
        if *self.fail_on_enqueue.read().await {
            return Err(QueueError::Unavailable(format!(
                "memory queue {} enqueue disabled",
                self.name
            )));
        }

        self.entries.lock().await.push(Entry {
            payload: payload.to_string(),
            visible_at: Instant::now(),
            dequeue_count: 0,
            receipt: None,
        });
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        Ok(entries
            .iter_mut()
            .filter(|e| e.visible_at <= now)
            .take(max)
            .map(|e| {
                let receipt = Uuid::new_v4().to_string();
                e.visible_at = now + self.visibility_timeout;
                e.dequeue_count += 1;
                e.receipt = Some(receipt.clone());
                Delivery {
                    receipt,
                    payload: e.payload.clone(),
                    dequeue_count: e.dequeue_count,
                }
            })
            .collect())
    }

    async fn ack(&self, receipt: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let index = entries
            .iter()
            .position(|e| e.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        entries.remove(index);
        Ok(())
    }

    async fn release(&self, receipt: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.receipt.as_deref() == Some(receipt))
            .ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;
        entry.visible_at = Instant::now();
        entry.receipt = None;
        Ok(())
    }
}
