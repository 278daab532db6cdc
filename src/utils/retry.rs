//! Retry utilities: backoff builders for transient failures.
//!
//! Uses `backon`. Store and queue writes retry at a fixed short delay for as
//! long as the failure stays transient; startup connections use exponential
//! backoff with jitter and give up eventually.

use std::time::Duration;

use backon::{ConstantBuilder, ExponentialBuilder};

/// Fixed-delay backoff for store and queue operations.
///
/// Retries without limit; callers restrict it to transient errors with
/// `.when(...)`.
pub fn transient_backoff(delay: Duration) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(delay)
        .with_max_times(usize::MAX)
}

/// Backoff for backend connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}
