//! Polling live tail over a channel log.
//!
//! The store has no change notification, so a tail is a cursor plus a
//! loop: catch up with the newest N messages, then repeatedly ask for
//! everything after the cursor, emit it in order and sleep.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CursorMode, TailConfig, DEFAULT_HISTORY, DEFAULT_TAIL_POLL_MS};
use crate::message::ChatMessage;
use crate::repository::ChatMessageRepository;
use crate::storage::keys::{decode_message_id, encode_sort_key};
use crate::storage::{Result, StorageError};

/// Position of the newest message a tail has emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailCursor {
    pub message_id: Uuid,
    pub sort_key: String,
}

impl TailCursor {
    fn at(message: &ChatMessage) -> Self {
        Self {
            message_id: message.message_id,
            sort_key: encode_sort_key(&message.sent_at, message.message_id),
        }
    }
}

/// What [`TailReader::run`] reports to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailEvent<'a> {
    /// A catch-up message, oldest first.
    History(&'a ChatMessage),
    /// Catch-up finished; everything after this is live.
    Live,
    /// A message that arrived while tailing.
    Message(&'a ChatMessage),
}

/// Catch-up then live tail of one channel.
///
/// The cursor lives as long as the reader, so a cancelled `run` can be
/// resumed and continues where it stopped.
pub struct TailReader {
    repository: ChatMessageRepository,
    channel_id: Uuid,
    history: usize,
    poll_interval: Duration,
    mode: CursorMode,
    cursor: Option<TailCursor>,
    caught_up: bool,
}

impl TailReader {
    pub fn new(repository: ChatMessageRepository, channel_id: Uuid) -> Self {
        Self {
            repository,
            channel_id,
            history: DEFAULT_HISTORY,
            poll_interval: Duration::from_millis(DEFAULT_TAIL_POLL_MS),
            mode: CursorMode::default(),
            cursor: None,
            caught_up: false,
        }
    }

    /// Create a reader configured from the `tail` settings.
    pub fn from_config(
        repository: ChatMessageRepository,
        channel_id: Uuid,
        config: &TailConfig,
    ) -> Self {
        Self::new(repository, channel_id)
            .with_history(config.history)
            .with_poll_interval(config.poll_interval())
            .with_cursor_mode(config.cursor)
    }

    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_cursor_mode(mut self, mode: CursorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    /// Newest emitted position, `None` until something has been seen.
    pub fn cursor(&self) -> Option<&TailCursor> {
        self.cursor.as_ref()
    }

    pub fn is_caught_up(&self) -> bool {
        self.caught_up
    }

    /// Fetch the newest `history` messages in chronological order and move
    /// the cursor to the newest message in the channel.
    ///
    /// The cursor is placed even when `history` is zero, so the live phase
    /// never replays old messages.
    pub async fn catch_up(&mut self) -> Result<Vec<ChatMessage>> {
        let mut latest = self
            .repository
            .latest(self.channel_id, self.history.max(1))
            .await?;

        if let Some(newest) = latest.last() {
            self.cursor = Some(TailCursor::at(newest));
        }
        if latest.len() > self.history {
            latest.drain(..latest.len() - self.history);
        }

        self.caught_up = true;
        debug!(
            channel = %self.channel_id,
            count = latest.len(),
            cursor = ?self.cursor.as_ref().map(|c| c.message_id),
            "Caught up"
        );
        Ok(latest)
    }

    /// Fetch everything after the cursor, oldest first, advancing the
    /// cursor past each returned message.
    ///
    /// Corrupt records are logged and skipped. A query failure after some
    /// messages were read returns those messages; the rest are picked up by
    /// the next poll.
    pub async fn poll(&mut self) -> Result<Vec<ChatMessage>> {
        let mut stream = match self.mode {
            CursorMode::MessageId => self
                .repository
                .tail_after(self.channel_id, self.cursor.as_ref().map(|c| c.message_id))
                .map(|item| item.map(|m| (encode_sort_key(&m.sent_at, m.message_id), m)))
                .boxed(),
            CursorMode::SortKey => self
                .repository
                .tail_after_key(self.channel_id, self.cursor.as_ref().map(|c| c.sort_key.clone())),
        };

        let mut messages = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok((sort_key, message)) => {
                    self.cursor = Some(TailCursor {
                        message_id: message.message_id,
                        sort_key,
                    });
                    messages.push(message);
                }
                Err(e) if e.is_corruption() => {
                    warn!(channel = %self.channel_id, error = %e, "Skipping corrupt chat record");
                    self.skip_corrupt(&e);
                }
                Err(e) if messages.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        channel = %self.channel_id,
                        error = %e,
                        read = messages.len(),
                        "Poll interrupted"
                    );
                    break;
                }
            }
        }

        Ok(messages)
    }

    /// In sort-key mode the cursor can move past a corrupt record so it is
    /// reported only once.
    fn skip_corrupt(&mut self, error: &StorageError) {
        if self.mode != CursorMode::SortKey {
            return;
        }
        let Some(sort_key) = error.sort_key() else {
            return;
        };
        match self.cursor.as_mut() {
            Some(cursor) if sort_key > cursor.sort_key.as_str() => {
                cursor.sort_key = sort_key.to_string();
            }
            Some(_) => {}
            // Nothing emitted yet; the id is a placeholder and unused in
            // sort-key mode.
            None => {
                self.cursor = Some(TailCursor {
                    message_id: decode_message_id(sort_key).unwrap_or_else(|_| Uuid::nil()),
                    sort_key: sort_key.to_string(),
                });
            }
        }
    }

    /// Catch up (once per reader), then tail until `token` is cancelled.
    ///
    /// Cancellation is observed between polls; a poll in progress
    /// completes and its messages are emitted. Failed polls are logged and
    /// retried after the poll interval.
    pub async fn run<F>(&mut self, token: &CancellationToken, mut on_event: F)
    where
        F: FnMut(TailEvent<'_>),
    {
        while !self.caught_up {
            match self.catch_up().await {
                Ok(history) => {
                    for message in &history {
                        on_event(TailEvent::History(message));
                    }
                    on_event(TailEvent::Live);
                    info!(channel = %self.channel_id, "Tailing channel");
                }
                Err(e) => {
                    warn!(channel = %self.channel_id, error = %e, "Catch-up failed");
                    if self.sleep(token).await {
                        return;
                    }
                }
            }
        }

        while !token.is_cancelled() {
            match self.poll().await {
                Ok(messages) => {
                    for message in &messages {
                        on_event(TailEvent::Message(message));
                    }
                }
                Err(e) => warn!(channel = %self.channel_id, error = %e, "Poll failed"),
            }

            if self.sleep(token).await {
                break;
            }
        }

        debug!(channel = %self.channel_id, "Tail stopped");
    }

    /// Sleep the poll interval. Returns true if cancelled meanwhile.
    async fn sleep(&self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => true,
            _ = tokio::time::sleep(self.poll_interval) => false,
        }
    }
}
