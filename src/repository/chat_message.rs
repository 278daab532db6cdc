//! Chat message repository.
//!
//! Maps chat messages onto table records and builds the channel log reads
//! (history, tail, latest) out of paged partition scans.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::ChatMessage;
use crate::storage::keys::{decode_message_id, encode_sort_key, partition_key};
use crate::storage::{Result, StorageError, TableRecord, TableStore};

/// Records fetched per partition query.
pub const PAGE_SIZE: usize = 100;

const AUTHOR: &str = "author";
const SENT_AT: &str = "sent_at";
const BODY: &str = "body";

/// Repository for a channel-partitioned chat log.
///
/// Every read is a fresh scan of the partition; nothing is cached, so two
/// calls with the same arguments observe every append acknowledged between
/// them.
#[derive(Clone)]
pub struct ChatMessageRepository {
    store: Arc<dyn TableStore>,
    page_size: usize,
}

impl ChatMessageRepository {
    /// Create a new repository with the default page size.
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self::with_page_size(store, PAGE_SIZE)
    }

    /// Create a new repository with a custom page size.
    pub fn with_page_size(store: Arc<dyn TableStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Create the backing table if needed.
    pub async fn create(&self) -> Result<()> {
        self.store.create_if_absent().await
    }

    /// Build the persisted form of a message.
    pub fn to_record(message: &ChatMessage) -> TableRecord {
        TableRecord::new(
            partition_key(message.channel_id),
            encode_sort_key(&message.sent_at, message.message_id),
        )
        .with_property(AUTHOR, message.author.as_str())
        .with_property(
            SENT_AT,
            message.sent_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        )
        .with_property(BODY, message.body.as_str())
    }

    /// Rebuild a message from a record in `channel_id`'s partition.
    ///
    /// The id comes from the sort key; everything else from properties.
    pub fn from_record(channel_id: Uuid, record: &TableRecord) -> Result<ChatMessage> {
        let message_id = decode_message_id(&record.sort_key)?;

        let field = |name: &str| {
            record
                .property(name)
                .ok_or_else(|| StorageError::MalformedRecord {
                    sort_key: record.sort_key.clone(),
                    reason: format!("missing property {name:?}"),
                })
        };

        let sent_at = DateTime::parse_from_rfc3339(field(SENT_AT)?)
            .map_err(|e| StorageError::MalformedRecord {
                sort_key: record.sort_key.clone(),
                reason: format!("bad {SENT_AT}: {e}"),
            })?
            .with_timezone(&Utc);

        Ok(ChatMessage {
            channel_id,
            message_id,
            author: field(AUTHOR)?.to_string(),
            sent_at,
            body: field(BODY)?.to_string(),
        })
    }

    /// Append a message to its channel.
    ///
    /// Insert-only: a message whose key is already stored fails with
    /// `StorageError::DuplicateKey` and the stored record is untouched.
    pub async fn append(&self, message: &ChatMessage) -> Result<()> {
        let record = Self::to_record(message);
        debug!(
            channel = %message.channel_id,
            sort_key = %record.sort_key,
            "Appending chat message"
        );
        self.store.insert(record).await
    }

    /// Every message in a channel, oldest first.
    ///
    /// Pages are fetched lazily as the stream is polled. A record that fails
    /// to decode is yielded as a corruption error and the stream moves on,
    /// across pages too; a failed query is yielded as an error and ends the
    /// stream.
    pub fn history(&self, channel_id: Uuid) -> BoxStream<'static, Result<ChatMessage>> {
        self.scan(channel_id, None)
            .map_ok(|(_, message)| message)
            .boxed()
    }

    /// Messages strictly after the one with id `cursor`, oldest first.
    ///
    /// `None` yields the whole channel. A cursor that is not in the channel
    /// yields nothing. Corrupt records before the cursor are not reported
    /// again; query failures always are.
    pub fn tail_after(
        &self,
        channel_id: Uuid,
        cursor: Option<Uuid>,
    ) -> BoxStream<'static, Result<ChatMessage>> {
        let Some(cursor) = cursor else {
            return self.history(channel_id);
        };

        let mut found = false;
        self.history(channel_id)
            .filter(move |item| {
                let emit = match item {
                    Ok(message) if !found => {
                        found = message.message_id == cursor;
                        false
                    }
                    Ok(_) => true,
                    Err(e) => found || e.is_transient(),
                };
                futures::future::ready(emit)
            })
            .boxed()
    }

    /// Messages whose sort key is strictly greater than `cursor`, oldest
    /// first, each with its sort key.
    ///
    /// A direct range query: no rescan of the records before the cursor.
    pub fn tail_after_key(
        &self,
        channel_id: Uuid,
        cursor: Option<String>,
    ) -> BoxStream<'static, Result<(String, ChatMessage)>> {
        self.scan(channel_id, cursor)
    }

    /// The newest `n` messages of a channel in chronological order.
    ///
    /// Corrupt records are logged and skipped.
    pub async fn latest(&self, channel_id: Uuid, n: usize) -> Result<Vec<ChatMessage>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut window = VecDeque::with_capacity(n);

        let mut messages = self.history(channel_id);
        while let Some(item) = messages.next().await {
            match item {
                Ok(message) => {
                    if window.len() == n {
                        window.pop_front();
                    }
                    window.push_back(message);
                }
                Err(e) if e.is_corruption() => {
                    warn!(channel = %channel_id, error = %e, "Skipping corrupt chat record");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(window.into())
    }

    /// Lazily page through a partition starting after `after`.
    fn scan(
        &self,
        channel_id: Uuid,
        after: Option<String>,
    ) -> BoxStream<'static, Result<(String, ChatMessage)>> {
        let store = Arc::clone(&self.store);
        let partition = partition_key(channel_id);
        let page_size = self.page_size;

        // State: `Some(after)` while more pages may exist, `None` when done.
        stream::unfold(Some(after), move |state| {
            let store = Arc::clone(&store);
            let partition = partition.clone();
            async move {
                let Some(after) = state else {
                    return None;
                };
                match store
                    .query_partition(&partition, after.as_deref(), page_size)
                    .await
                {
                    Ok(page) => {
                        // Corrupt rows still carry their sort key, so paging
                        // continues past them.
                        let last_key = page
                            .iter()
                            .rev()
                            .find_map(|item| match item {
                                Ok(record) => Some(record.sort_key.as_str()),
                                Err(e) => e.sort_key().filter(|key| !key.is_empty()),
                            })
                            .map(str::to_string);
                        let next = if page.len() < page_size {
                            None
                        } else {
                            last_key.map(Some)
                        };
                        let items: Vec<Result<(String, ChatMessage)>> = page
                            .into_iter()
                            .map(|item| {
                                let record = item?;
                                let message = Self::from_record(channel_id, &record)?;
                                Ok((record.sort_key, message))
                            })
                            .collect();
                        Some((stream::iter(items), next))
                    }
                    Err(e) => Some((stream::iter(vec![Err(e)]), None)),
                }
            }
        })
        .flatten()
        .boxed()
    }
}
