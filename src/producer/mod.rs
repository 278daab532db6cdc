//! Fake message generator.
//!
//! Keeps a channel busy so the console has something to tail: random user
//! names, short review-style sentences, randomized gaps between messages.

use std::time::Duration;

use backon::Retryable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ProducerConfig;
use crate::message::ChatMessage;
use crate::queue::{ChatMessageQueue, QueueError};
use crate::utils::retry::transient_backoff;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Bram", "Cleo", "Dara", "Emil", "Fern", "Gus", "Hana", "Ivo", "Juno", "Kai", "Lena",
    "Milo", "Nia", "Otto", "Pia", "Quin", "Rhea", "Sami", "Tova",
];

const LAST_NAMES: &[&str] = &[
    "Abbott", "Baker", "Conn", "Dietz", "Ernser", "Fritsch", "Grady", "Hane", "Kuhn", "Lind",
    "Mraz", "Nader", "Ortiz", "Price", "Runte", "Stark", "Toy", "Wolff",
];

const OPENERS: &[&str] = &[
    "My neighbor Karen bought one of these",
    "I tried this at the office",
    "One of my hobbies is hiking, so naturally I took this along",
    "This thing arrived a day early",
    "My cat knocked this off the shelf twice",
    "I got this as a gift",
    "I used it for a whole week",
];

const VERDICTS: &[&str] = &[
    "and it works perfectly",
    "and honestly it is just okay",
    "and it broke within an hour",
    "and it exceeded my expectations",
    "and now I can't live without it",
    "and it smells faintly of oranges",
    "and I would buy it again",
];

const CLOSERS: &[&str] = &[
    "Five stars.",
    "Two stars.",
    "talk about fun!",
    "i use it once in a while.",
    "heard about this on the radio, decided to give it a try.",
    "It only works when I'm on Mars.",
    "Would not recommend.",
];

/// Infinite source of fake chat messages for one channel.
pub struct MessageGenerator {
    channel_id: Uuid,
    rng: StdRng,
    min_delay: Duration,
    max_delay: Duration,
}

impl MessageGenerator {
    pub fn new(channel_id: Uuid, config: &ProducerConfig) -> Self {
        Self::with_rng(channel_id, config, StdRng::from_rng(&mut rand::rng()))
    }

    /// Deterministic generator for tests.
    pub fn with_seed(channel_id: Uuid, config: &ProducerConfig, seed: u64) -> Self {
        Self::with_rng(channel_id, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(channel_id: Uuid, config: &ProducerConfig, rng: StdRng) -> Self {
        let min_delay = Duration::from_millis(config.min_delay_ms);
        let max_delay = Duration::from_millis(config.max_delay_ms).max(min_delay);
        Self {
            channel_id,
            rng,
            min_delay,
            max_delay,
        }
    }

    fn pick(&mut self, words: &[&'static str]) -> &'static str {
        words[self.rng.random_range(0..words.len())]
    }

    fn username(&mut self) -> String {
        let first = self.pick(FIRST_NAMES);
        let last = self.pick(LAST_NAMES);
        match self.rng.random_range(0..3) {
            0 => format!("{first}.{last}"),
            1 => format!("{first}_{last}{}", self.rng.random_range(0..100)),
            _ => format!("{first}{}", self.rng.random_range(10..1000)),
        }
    }

    fn review(&mut self) -> String {
        let opener = self.pick(OPENERS);
        let verdict = self.pick(VERDICTS);
        let closer = self.pick(CLOSERS);
        format!("{opener} {verdict}. {closer}")
    }

    /// A new message stamped now with a fresh id.
    pub fn next_message(&mut self) -> ChatMessage {
        let author = self.username();
        let body = self.review();
        ChatMessage::new(self.channel_id, author, body)
    }

    /// Gap before the next message, uniform in `[min_delay, max_delay)`.
    pub fn next_delay(&mut self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        self.rng.random_range(self.min_delay..self.max_delay)
    }
}

impl Iterator for MessageGenerator {
    type Item = ChatMessage;

    fn next(&mut self) -> Option<ChatMessage> {
        Some(self.next_message())
    }
}

/// Enqueue generated messages until `token` is cancelled.
///
/// Transient enqueue failures are retried every `retry_delay` until they
/// succeed or the producer is cancelled.
pub async fn run_producer(
    mut generator: MessageGenerator,
    queue: ChatMessageQueue,
    retry_delay: Duration,
    token: CancellationToken,
) {
    info!(channel = %generator.channel_id, "Starting message generator");

    while !token.is_cancelled() {
        let message = generator.next_message();

        let enqueue = (|| queue.enqueue(&message))
            .retry(transient_backoff(retry_delay))
            .when(QueueError::is_transient)
            .notify(|err: &QueueError, dur: Duration| {
                warn!(error = %err, delay = ?dur, "Enqueue failed, retrying");
            });

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = enqueue => {
                if let Err(e) = result {
                    error!(message_id = %message.message_id, error = %e, "Dropping message");
                }
            }
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(generator.next_delay()) => {}
        }
    }

    info!(channel = %generator.channel_id, "Message generator stopped");
}
