//! Console-side configuration: tail reader, message generator and retry.

use std::time::Duration;

use serde::Deserialize;

/// Default number of messages shown on catch-up.
pub const DEFAULT_HISTORY: usize = 10;
/// Default live tail poll interval in milliseconds.
pub const DEFAULT_TAIL_POLL_MS: u64 = 300;

/// What the tail reader remembers as its position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    /// Last seen message id. Each poll rescans the partition and skips
    /// through the cursor record.
    #[default]
    MessageId,
    /// Last seen sort key. Each poll is a range query strictly after it.
    SortKey,
}

/// Tail reader configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Messages emitted during catch-up.
    pub history: usize,
    /// Sleep between live polls.
    pub poll_interval_ms: u64,
    /// Cursor strategy.
    pub cursor: CursorMode,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            history: DEFAULT_HISTORY,
            poll_interval_ms: DEFAULT_TAIL_POLL_MS,
            cursor: CursorMode::default(),
        }
    }
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Fake message generator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Run the generator alongside the console.
    pub enabled: bool,
    /// Lower bound of the delay between messages.
    pub min_delay_ms: u64,
    /// Upper bound (exclusive) of the delay between messages.
    pub max_delay_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

/// Retry configuration for transient failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed delay between attempts.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { delay_ms: 500 }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
