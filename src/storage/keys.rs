//! Partition and sort key encoding for chat records.
//!
//! One channel is one partition. Inside a partition the sort key is
//!
//! ```text
//! {seconds:020}{nanos:010}.{message_id}
//! ```
//!
//! `seconds` is the signed Unix timestamp biased by 2^63 so that every
//! representable instant becomes an unsigned value, and `nanos` is the
//! sub-second part (ten digits so leap-second nanos above 1e9 still fit).
//! Both are zero-padded to a fixed width, which makes lexicographic order
//! of the timestamp prefix identical to chronological order. The message
//! id is written as a hyphenated lowercase UUID, whose string order equals
//! its byte order, so ties on the timestamp fall back to `Uuid` ordering.
//!
//! The key only carries order. Readers recover `sent_at` from the record
//! properties and only the message id from the key.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Result, StorageError};

/// Separator between the timestamp prefix and the message id.
pub const SEPARATOR: char = '.';

const SECONDS_WIDTH: usize = 20;
const NANOS_WIDTH: usize = 10;
const TIMESTAMP_WIDTH: usize = SECONDS_WIDTH + NANOS_WIDTH;
const SECONDS_BIAS: i128 = 1 << 63;

/// Partition key for a channel.
pub fn partition_key(channel_id: Uuid) -> String {
    channel_id.hyphenated().to_string()
}

/// Encode the sort key for a message.
///
/// For two messages in the same channel, `encode_sort_key(a) <
/// encode_sort_key(b)` exactly when `(a.sent_at, a.message_id) <
/// (b.sent_at, b.message_id)`.
pub fn encode_sort_key(sent_at: &DateTime<Utc>, message_id: Uuid) -> String {
    let seconds = (sent_at.timestamp() as i128 + SECONDS_BIAS) as u64;
    let nanos = sent_at.timestamp_subsec_nanos();
    format!(
        "{:0sw$}{:0nw$}{}{}",
        seconds,
        nanos,
        SEPARATOR,
        message_id.hyphenated(),
        sw = SECONDS_WIDTH,
        nw = NANOS_WIDTH,
    )
}

/// Extract the message id from a sort key.
pub fn decode_message_id(sort_key: &str) -> Result<Uuid> {
    let malformed = || StorageError::MalformedKey(sort_key.to_string());

    let timestamp = sort_key.get(..TIMESTAMP_WIDTH).ok_or_else(malformed)?;
    if !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let id = sort_key
        .get(TIMESTAMP_WIDTH..)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .ok_or_else(malformed)?;

    Uuid::try_parse(id).map_err(|_| malformed())
}
